//! In-process [`ContentStore`] that mimics the GitHub contents API semantics.
//!
//! Missing paths answer with a 404 and a stale version token with a 409, using bodies shaped like
//! GitHub's, so the relay's error relaying can be exercised without a network.

use super::{ContentStore, FileMetadata, Result, StoreError};
use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use dashmap::DashMap;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};

const DEFAULT_PUBLIC_BASE: &str = "memory://content";

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub content: Bytes,
    pub sha: String,
    pub message: String,
}

#[derive(Debug)]
pub struct InMemoryContentStore {
    files: DashMap<String, StoredFile>,
    public_base: String,
    puts: AtomicUsize,
    gets: AtomicUsize,
    deletes: AtomicUsize,
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLIC_BASE)
    }
}

impl InMemoryContentStore {
    /// `public_base` is prefixed to stored paths to form their public URL.
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            files: DashMap::new(),
            public_base: public_base.into(),
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn file(&self, path: &str) -> Option<StoredFile> {
        self.files.get(path).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Number of put/get/delete calls received, in that order.
    pub fn call_counts(&self) -> (usize, usize, usize) {
        (
            self.puts.load(Ordering::SeqCst),
            self.gets.load(Ordering::SeqCst),
            self.deletes.load(Ordering::SeqCst),
        )
    }
}

fn version_token(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

fn not_found() -> StoreError {
    StoreError::Upstream {
        status: StatusCode::NOT_FOUND,
        body: json!({ "message": "Not Found", "status": "404" }),
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put_file(&self, path: &str, content: &[u8], message: &str) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let file = StoredFile {
            content: Bytes::copy_from_slice(content),
            sha: version_token(content),
            message: message.to_string(),
        };
        self.files.insert(path.to_string(), file);
        Ok(())
    }

    async fn get_file(&self, path: &str) -> Result<FileMetadata> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let file = self.files.get(path).ok_or_else(not_found)?;
        Ok(FileMetadata {
            path: path.to_string(),
            sha: file.sha.clone(),
        })
    }

    async fn delete_file(&self, path: &str, sha: &str, _message: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        match self.files.remove_if(path, |_, file| file.sha == sha) {
            Some(_) => Ok(()),
            None if self.files.contains_key(path) => Err(StoreError::Upstream {
                status: StatusCode::CONFLICT,
                body: json!({ "message": format!("{path} does not match {sha}"), "status": "409" }),
            }),
            None => Err(not_found()),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base.trim_end_matches('/'), path)
    }
}
