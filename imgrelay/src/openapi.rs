//! OpenAPI documentation for the relay's HTTP surface.
//!
//! The document is served as JSON at `/api/openapi.json` and rendered at `/api/docs`.

use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "imgrelay",
        description = "Stores uploaded images as commits in a GitHub repository and removes them again."
    ),
    paths(
        api::handlers::health::ping,
        api::handlers::images::upload_image,
        api::handlers::images::delete_image,
    ),
    components(schemas(
        api::models::images::OkResponse,
        api::models::images::UploadResponse,
        api::models::images::DeleteRequest,
        api::models::images::ErrorResponse,
    )),
    tags(
        (name = "health", description = "Liveness"),
        (name = "images", description = "Image upload and deletion"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/api/ping", "/api/upload", "/api/delete"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
