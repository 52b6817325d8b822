//! Remote content store abstraction.
//!
//! The relay never stores anything itself. It talks to a hosted, version-controlled file API
//! through the [`ContentStore`] trait, which exposes the three operations it needs:
//!
//! - create-or-update a file by path
//! - fetch metadata for a path, including its version token
//! - delete a file by path and version token
//!
//! [`github::GithubContentStore`] is the production implementation. [`memory::InMemoryContentStore`]
//! keeps files in process memory and is used wherever network access is unwanted, most notably
//! in tests.

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;

pub mod github;
pub mod memory;

pub use github::GithubContentStore;
pub use memory::InMemoryContentStore;

/// Errors returned by a [`ContentStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store answered with a non-success status
    #[error("remote store responded with {status}: {body}")]
    Upstream { status: StatusCode, body: Value },

    /// The request never produced a response (connect failure, timeout, ...)
    #[error("request to remote store failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The store answered successfully but the body was not what we expected
    #[error("error decoding response body: {0}")]
    Decode(String),

    /// Metadata lookup resolved to something without a version token, e.g. a directory
    #[error("{path} does not refer to a file")]
    NotAFile { path: String },

    #[error("invalid remote store url: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Metadata for a stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub path: String,
    /// Opaque version token required to delete the file
    pub sha: String,
}

/// A hosted, version-controlled file store keyed by repository path.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Create or update the file at `path` with `content`, committing with `message`.
    async fn put_file(&self, path: &str, content: &[u8], message: &str) -> Result<()>;

    /// Fetch metadata for `path`, including its current version token.
    async fn get_file(&self, path: &str) -> Result<FileMetadata>;

    /// Delete the file at `path`. `sha` must match the file's current version token.
    async fn delete_file(&self, path: &str, sha: &str, message: &str) -> Result<()>;

    /// The publicly fetchable URL for a stored path.
    fn public_url(&self, path: &str) -> String;
}
