use crate::api::models::images::OkResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/api/ping",
    tag = "health",
    summary = "Ping",
    description = "Acknowledges that the relay process is reachable. Does not contact the remote store.",
    responses(
        (status = 200, description = "Relay is up", body = OkResponse),
    )
)]
pub async fn ping() -> Json<OkResponse> {
    Json(OkResponse::ok())
}
