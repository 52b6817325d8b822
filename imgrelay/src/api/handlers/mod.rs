//! HTTP request handlers.
//!
//! - [`health`]: liveness check
//! - [`images`]: image upload and deletion
//!
//! Handlers return [`crate::errors::Error`], which renders as a JSON `{ "error": ... }` body
//! with the most specific status known.

pub mod health;
pub mod images;
