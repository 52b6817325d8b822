use crate::relay::StoredObject;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Acknowledgement body shared by ping and delete
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Reference to an uploaded image
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Repository-relative path the image was committed to
    #[schema(example = "images/1700000000000_pic_1.png")]
    pub path: String,
    /// Public URL the image can be fetched from
    #[schema(example = "https://raw.githubusercontent.com/octo/gallery/main/images/1700000000000_pic_1.png")]
    pub url: String,
}

impl From<StoredObject> for UploadResponse {
    fn from(stored: StoredObject) -> Self {
        Self {
            path: stored.path,
            url: stored.url,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct DeleteRequest {
    /// Repository-relative path returned by a previous upload
    #[serde(default)]
    pub path: Option<String>,
}

/// Error body returned by every endpoint. `error` is either a message or, for failures reported
/// by the remote store, the store's own error body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(value_type = Object)]
    pub error: serde_json::Value,
}
