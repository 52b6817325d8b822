//! Upload and delete orchestration.
//!
//! Each request becomes at most two sequential calls against the [`ContentStore`]:
//!
//! - **upload**: one create-or-update at `<prefix>/<unix-millis>_<sanitized-name>`
//! - **delete**: a metadata fetch for the version token, then a delete carrying that token
//!
//! Nothing is retried and nothing is remembered between requests. Storage paths are derived from
//! the wall clock and the filename, so two uploads of the same name within the same millisecond
//! map to the same path and the second overwrites the first.

use crate::errors::{Error, Result};
use crate::store::ContentStore;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

/// Source of upload timestamps.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Always returns the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

/// A file received from a client, held in memory until relayed.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub data: Bytes,
}

/// Where an upload ended up. The relay keeps no record of it after responding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub path: String,
    pub url: String,
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`, one for one.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect()
}

/// The final component of a client-supplied filename. Both `/` and `\` count as separators.
pub fn base_name(file_name: &str) -> &str {
    let trimmed = file_name.trim_end_matches(['/', '\\']);
    trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed)
}

pub fn storage_path(prefix: &str, timestamp_millis: i64, sanitized_name: &str) -> String {
    format!("{}/{}_{}", prefix.trim_matches('/'), timestamp_millis, sanitized_name)
}

/// Normalize a caller supplied repository path for deletion.
///
/// A leading `/` is dropped. Empty paths are rejected as missing; paths with empty, `.` or `..`
/// segments are rejected as invalid.
pub fn normalize_delete_path(path: Option<&str>) -> Result<&str> {
    let path = path.map(|p| p.trim_start_matches('/')).unwrap_or_default();
    if path.is_empty() {
        return Err(Error::bad_request("path is required"));
    }
    if path.split('/').any(|segment| matches!(segment, "" | "." | "..")) {
        return Err(Error::bad_request("invalid path"));
    }
    Ok(path)
}

/// Turns uploads and deletes into calls against a [`ContentStore`].
pub struct ImageRelay {
    store: Option<Arc<dyn ContentStore>>,
    clock: Arc<dyn Clock>,
    path_prefix: String,
}

impl ImageRelay {
    /// `store` is `None` when credentials are missing; every operation then fails with
    /// [`Error::NotConfigured`] before touching the network.
    pub fn new(store: Option<Arc<dyn ContentStore>>, clock: Arc<dyn Clock>, path_prefix: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            path_prefix: path_prefix.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&dyn ContentStore> {
        self.store.as_deref().ok_or(Error::NotConfigured)
    }

    #[instrument(skip(self, upload), fields(file_name = %upload.file_name, bytes = upload.data.len()))]
    pub async fn upload(&self, upload: ImageUpload) -> Result<StoredObject> {
        let store = self.store()?;

        let name = sanitize_filename(base_name(&upload.file_name));
        let path = storage_path(&self.path_prefix, self.clock.now_millis(), &name);
        let message = format!("Add image {name}");

        store.put_file(&path, &upload.data, &message).await?;

        let url = store.public_url(&path);
        info!(path = %path, "Stored image");
        Ok(StoredObject { path, url })
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, path: &str) -> Result<()> {
        let store = self.store()?;

        // A failed lookup short-circuits: the delete is never issued
        let metadata = store.get_file(path).await?;
        store
            .delete_file(path, &metadata.sha, &format!("Remove image {path}"))
            .await?;

        info!(path = %path, "Deleted image");
        Ok(())
    }
}
