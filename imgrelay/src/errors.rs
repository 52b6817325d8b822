use crate::store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error as ThisError;

pub const NOT_CONFIGURED_MESSAGE: &str = "Server not configured with GITHUB_TOKEN";

#[derive(ThisError, Debug)]
pub enum Error {
    /// Required input missing or malformed
    #[error("{message}")]
    BadRequest { message: String },

    /// Uploaded file exceeds the configured size bound
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// Remote store credentials or coordinates are absent
    #[error("{}", NOT_CONFIGURED_MESSAGE)]
    NotConfigured,

    /// The remote store answered with a non-success status. Status and body are relayed as-is.
    #[error("Remote store responded with {status}")]
    Upstream { status: StatusCode, body: Value },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Upstream { status, .. } => *status,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The value placed under `error` in the response body.
    pub fn error_body(&self) -> Value {
        match self {
            Error::Upstream { body, .. } => body.clone(),
            // Internal errors surface their cause to the caller
            Error::Other(err) => Value::String(format!("{err:#}")),
            other => Value::String(other.to_string()),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Upstream { status, body } => Error::Upstream { status, body },
            StoreError::NotAFile { .. } => Error::bad_request("path does not refer to a file"),
            other => Error::Other(other.into()),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Other(_) | Error::NotConfigured => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Upstream { status, body } => {
                tracing::warn!(%status, %body, "Relaying remote store error");
            }
            Error::BadRequest { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), Json(json!({ "error": self.error_body() }))).into_response()
    }
}

/// Type alias for relay operation results
pub type Result<T> = std::result::Result<T, Error>;
