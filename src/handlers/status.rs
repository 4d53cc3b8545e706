//! Status handler: the upload log.

use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::upload_log::LogEntry;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub logs: Vec<LogEntry>,
}

/// `GET /status` -- every upload log entry, oldest first.
#[utoipa::path(
    get,
    path = "/status",
    tag = "Status",
    operation_id = "Status",
    responses((status = 200, description = "Upload log"))
)]
pub async fn status(state: Arc<AppState>) -> Response {
    Json(StatusResponse {
        logs: state.store.log().snapshot(),
    })
    .into_response()
}
