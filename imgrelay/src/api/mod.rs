//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response bodies
//!
//! # API Structure
//!
//! - `GET /api/ping`: liveness acknowledgement
//! - `POST /api/upload`: multipart upload, committed to the remote store
//! - `POST /api/delete`: removes a previously uploaded path from the remote store
//!
//! Every failure is a JSON `{ "error": ... }` body; see [`crate::errors`].

pub mod handlers;
pub mod models;
