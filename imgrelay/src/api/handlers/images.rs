use crate::AppState;
use crate::api::models::images::{DeleteRequest, ErrorResponse, OkResponse, UploadResponse};
use crate::errors::{Error, Result};
use crate::relay::{ImageUpload, normalize_delete_path};
use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderMap, StatusCode, header},
};
use bytes::BytesMut;

const NO_FILE_MESSAGE: &str = "No file uploaded";

fn too_large(max_file_size: u64) -> Error {
    let megabytes = max_file_size / (1024 * 1024);
    let message = if megabytes == 0 {
        format!("File size exceeds maximum allowed size of {max_file_size} bytes")
    } else {
        format!("File size exceeds maximum allowed size of {max_file_size} bytes ({megabytes} MB)")
    };
    Error::PayloadTooLarge { message }
}

/// `application/json` or any `+json` media type.
fn is_json(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    essence == "application/json" || (essence.starts_with("application/") && essence.ends_with("+json"))
}

fn multipart_error(err: MultipartError, max_file_size: u64) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large(max_file_size);
    }
    Error::bad_request(format!("Failed to parse multipart data: {}", err.body_text()))
}

#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "images",
    summary = "Upload image",
    description = "Commit a single image to the configured repository. The file is read from the \
                   `image` multipart field and stored at `images/<unix-millis>_<sanitized-name>`.",
    request_body(
        content_type = "multipart/form-data",
        description = "Multipart form with the image in the `image` field"
    ),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "No file uploaded", body = ErrorResponse),
        (status = 413, description = "File exceeds the size limit", body = ErrorResponse),
        (status = 500, description = "Relay not configured, or the request failed", body = ErrorResponse),
        (status = "default", description = "Remote store error, relayed with its status", body = ErrorResponse),
    )
)]
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    // Anything that isn't multipart simply has no file in it
    let Ok(mut multipart) = multipart else {
        return Err(Error::bad_request(NO_FILE_MESSAGE));
    };

    let field_name = state.config.upload.field_name.as_str();
    let max_file_size = state.config.upload.max_file_size;
    let mut upload = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_file_size))?
    {
        if field.name() != Some(field_name) {
            continue;
        }
        // Parts without a filename are plain form values, not files
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, max_file_size))? {
            if (data.len() + chunk.len()) as u64 > max_file_size {
                tracing::warn!(
                    file_name = %file_name,
                    max_file_size,
                    "File size limit exceeded, aborting upload"
                );
                return Err(too_large(max_file_size));
            }
            data.extend_from_slice(&chunk);
        }

        upload = Some(ImageUpload {
            file_name,
            data: data.freeze(),
        });
        break;
    }

    let upload = upload.ok_or_else(|| Error::bad_request(NO_FILE_MESSAGE))?;
    let stored = state.relay.upload(upload).await?;

    Ok(Json(stored.into()))
}

#[utoipa::path(
    post,
    path = "/api/delete",
    tag = "images",
    summary = "Delete image",
    description = "Remove a previously uploaded image. The current version token is looked up first; \
                   if that lookup fails its error is relayed and no delete is attempted.",
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "Image deleted", body = OkResponse),
        (status = 400, description = "path is missing or invalid", body = ErrorResponse),
        (status = 500, description = "Relay not configured, or the request failed", body = ErrorResponse),
        (status = "default", description = "Remote store error, relayed with its status", body = ErrorResponse),
    )
)]
pub async fn delete_image(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<OkResponse>> {
    // Absent or non-JSON bodies behave like `{}`
    let request: DeleteRequest = if !is_json(&headers) || body.iter().all(u8::is_ascii_whitespace) {
        DeleteRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| Error::bad_request(format!("Invalid JSON body: {e}")))?
    };

    let path = normalize_delete_path(request.path.as_deref())?;
    state.relay.delete(path).await?;

    Ok(Json(OkResponse::ok()))
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::relay::{FixedClock, ImageRelay};
    use crate::store::{GithubContentStore, InMemoryContentStore};
    use crate::test_utils::*;
    use axum::http::StatusCode;
    use axum::body::Bytes;
    use axum_test::multipart::{MultipartForm, Part};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn image_form(file_name: &str, data: &'static [u8]) -> MultipartForm {
        MultipartForm::new().add_part("image", Part::bytes(data).file_name(file_name))
    }

    #[tokio::test]
    async fn test_upload_returns_path_and_url() {
        let store = Arc::new(InMemoryContentStore::new("https://raw.example.com/octo/gallery/main"));
        let server = create_test_server(memory_relay(store.clone()));

        let response = server.post("/api/upload").multipart(image_form("pic#1.png", b"abc")).await;

        response.assert_status_ok();
        response.assert_json(&json!({
            "path": "images/1700000000000_pic_1.png",
            "url": "https://raw.example.com/octo/gallery/main/images/1700000000000_pic_1.png",
        }));
        assert_eq!(store.file("images/1700000000000_pic_1.png").unwrap().content.as_ref(), b"abc");
    }

    #[tokio::test]
    async fn test_upload_without_file_field() {
        let server = create_test_server(memory_relay(Arc::new(InMemoryContentStore::default())));

        let response = server
            .post("/api/upload")
            .multipart(MultipartForm::new().add_text("caption", "hello"))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "error": "No file uploaded" }));
    }

    #[tokio::test]
    async fn test_upload_with_non_multipart_body() {
        let server = create_test_server(memory_relay(Arc::new(InMemoryContentStore::default())));

        let response = server.post("/api/upload").json(&json!({ "image": "abc" })).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "error": "No file uploaded" }));
    }

    #[tokio::test]
    async fn test_upload_field_without_filename_is_not_a_file() {
        let server = create_test_server(memory_relay(Arc::new(InMemoryContentStore::default())));

        let response = server
            .post("/api/upload")
            .multipart(MultipartForm::new().add_text("image", "abc"))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_when_not_configured() {
        let server = create_test_server(unconfigured_relay());

        let response = server.post("/api/upload").multipart(image_form("a.png", b"abc")).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&json!({ "error": "Server not configured with GITHUB_TOKEN" }));
    }

    #[tokio::test]
    async fn test_upload_missing_file_is_checked_before_configuration() {
        let server = create_test_server(unconfigured_relay());

        let response = server
            .post("/api/upload")
            .multipart(MultipartForm::new().add_text("caption", "hello"))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_over_size_limit() {
        let store = Arc::new(InMemoryContentStore::default());
        let mut config = test_config();
        config.upload.max_file_size = 4;
        let server = create_test_server_with_config(config, memory_relay(store.clone()));

        let response = server.post("/api/upload").multipart(image_form("a.png", b"abcdefgh")).await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        response.assert_json(&json!({ "error": "File size exceeds maximum allowed size of 4 bytes" }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_size_limit_message_units() {
        assert_eq!(
            super::too_large(2 * 1024 * 1024).to_string(),
            "File size exceeds maximum allowed size of 2097152 bytes (2 MB)"
        );
        assert_eq!(
            super::too_large(1000).to_string(),
            "File size exceeds maximum allowed size of 1000 bytes"
        );
    }

    #[tokio::test]
    async fn test_upload_body_over_route_limit() {
        let store = Arc::new(InMemoryContentStore::default());
        let mut config = test_config();
        config.upload.max_file_size = 4;
        let server = create_test_server_with_config(config, memory_relay(store.clone()));

        // A large leading part trips the request body limit before the image is reached
        let form = MultipartForm::new()
            .add_text("caption", "x".repeat(200 * 1024))
            .add_part("image", Part::bytes(&b"abc"[..]).file_name("a.png"));
        let response = server.post("/api/upload").multipart(form).await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        response.assert_json(&json!({ "error": "File size exceeds maximum allowed size of 4 bytes" }));
        assert!(store.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_relays_github_error_verbatim() {
        let github = MockServer::start().await;
        let upstream = json!({
            "message": "Resource not accessible by personal access token",
            "status": "403",
        });
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403).set_body_json(upstream.clone()))
            .mount(&github)
            .await;

        let server = create_test_server(github_relay(&github));
        let response = server.post("/api/upload").multipart(image_form("a.png", b"abc")).await;

        response.assert_status(StatusCode::FORBIDDEN);
        response.assert_json(&json!({ "error": upstream }));
    }

    #[test_log::test(tokio::test)]
    async fn test_upload_network_failure_is_internal_error() {
        let mut config = Config::default();
        config.github.api_url = Url::parse("http://127.0.0.1:1").unwrap();
        let store = GithubContentStore::new(test_credentials(), &config.github).unwrap();
        let relay = ImageRelay::new(Some(Arc::new(store)), Arc::new(FixedClock(TEST_TIMESTAMP)), "images");
        let server = create_test_server(relay);

        let response = server.post("/api/upload").multipart(image_form("a.png", b"abc")).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert!(body["error"].as_str().unwrap().contains("request to remote store failed"));
    }

    #[tokio::test]
    async fn test_upload_then_delete() {
        let store = Arc::new(InMemoryContentStore::default());
        let server = create_test_server(memory_relay(store.clone()));

        let uploaded = server.post("/api/upload").multipart(image_form("a.png", b"abc")).await;
        uploaded.assert_status_ok();
        let path = uploaded.json::<Value>()["path"].as_str().unwrap().to_string();

        let response = server.post("/api/delete").json(&json!({ "path": path })).await;

        response.assert_status_ok();
        response.assert_json(&json!({ "ok": true }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_without_path() {
        let server = create_test_server(memory_relay(Arc::new(InMemoryContentStore::default())));

        for body in [json!({}), json!({ "path": "" })] {
            let response = server.post("/api/delete").json(&body).await;
            response.assert_status(StatusCode::BAD_REQUEST);
            response.assert_json(&json!({ "error": "path is required" }));
        }

        let response = server.post("/api/delete").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "error": "path is required" }));
    }

    #[tokio::test]
    async fn test_delete_with_malformed_json() {
        let server = create_test_server(memory_relay(Arc::new(InMemoryContentStore::default())));

        let response = server
            .post("/api/delete")
            .bytes(Bytes::from_static(b"{not json"))
            .content_type("application/json")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"));
    }

    #[tokio::test]
    async fn test_delete_ignores_non_json_content_type() {
        let store = Arc::new(InMemoryContentStore::default());
        let server = create_test_server(memory_relay(store.clone()));
        server
            .post("/api/upload")
            .multipart(image_form("a.png", b"abc"))
            .await
            .assert_status_ok();

        let response = server
            .post("/api/delete")
            .text(r#"{"path":"images/1700000000000_a.png"}"#)
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        response.assert_json(&json!({ "error": "path is required" }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_accepts_json_with_charset() {
        let store = Arc::new(InMemoryContentStore::default());
        let server = create_test_server(memory_relay(store.clone()));
        server
            .post("/api/upload")
            .multipart(image_form("a.png", b"abc"))
            .await
            .assert_status_ok();

        let response = server
            .post("/api/delete")
            .bytes(Bytes::from_static(br#"{"path":"images/1700000000000_a.png"}"#))
            .content_type("application/json; charset=utf-8")
            .await;

        response.assert_status_ok();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_when_not_configured() {
        let server = create_test_server(unconfigured_relay());

        let response = server.post("/api/delete").json(&json!({ "path": "images/a.png" })).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        response.assert_json(&json!({ "error": "Server not configured with GITHUB_TOKEN" }));
    }

    #[test_log::test(tokio::test)]
    async fn test_delete_lookup_failure_is_relayed_and_delete_skipped() {
        let github = MockServer::start().await;
        let not_found = json!({
            "message": "Not Found",
            "documentation_url": "https://docs.github.com/rest/repos/contents#get-repository-content",
            "status": "404",
        });
        Mock::given(method("GET"))
            .and(path("/repos/octo/gallery/contents/images/missing.png"))
            .and(query_param("ref", "main"))
            .respond_with(ResponseTemplate::new(404).set_body_json(not_found.clone()))
            .expect(1)
            .mount(&github)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&github)
            .await;

        let server = create_test_server(github_relay(&github));
        let response = server
            .post("/api/delete")
            .json(&json!({ "path": "images/missing.png" }))
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
        response.assert_json(&json!({ "error": not_found }));
    }

    #[test_log::test(tokio::test)]
    async fn test_delete_against_github() {
        let github = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/gallery/contents/images/a.png"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "type": "file", "sha": "abc123" })))
            .expect(1)
            .mount(&github)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/repos/octo/gallery/contents/images/a.png"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "content": null })))
            .expect(1)
            .mount(&github)
            .await;

        let server = create_test_server(github_relay(&github));
        let response = server.post("/api/delete").json(&json!({ "path": "images/a.png" })).await;

        response.assert_status_ok();
        response.assert_json(&json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_delete_twice_relays_not_found() {
        let store = Arc::new(InMemoryContentStore::default());
        let server = create_test_server(memory_relay(store.clone()));

        let uploaded = server.post("/api/upload").multipart(image_form("a.png", b"abc")).await;
        let path = uploaded.json::<Value>()["path"].as_str().unwrap().to_string();

        server.post("/api/delete").json(&json!({ "path": path })).await.assert_status_ok();
        let second = server.post("/api/delete").json(&json!({ "path": path })).await;

        second.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(second.json::<Value>()["error"]["message"], "Not Found");
    }
}
