//! Read-side handlers: the zip bundle and the nested project listing.

use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::errors::ApiError;
use crate::storage::bundle::{self, BUNDLE_FILENAME};
use crate::storage::contents::PROJECT_EXTENSION;
use crate::storage::index::{self, IndexOutcome};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProjectListing {
    pub sb3_files: Vec<String>,
}

/// `GET /uploads/files` -- every stored object as `uploads.zip`.
#[utoipa::path(
    get,
    path = "/uploads/files",
    tag = "Objects",
    operation_id = "DownloadBundle",
    responses(
        (status = 200, description = "Zip archive of all objects"),
        (status = 500, description = "Listing failed")
    )
)]
pub async fn download_bundle(state: Arc<AppState>) -> Result<Response, ApiError> {
    let bytes = bundle::export(&state.store).await.map_err(|e| {
        state.store.log().error(format!("Error creating zip: {e}"));
        ApiError::from(e)
    })?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{BUNDLE_FILENAME}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// `GET /contents` -- `.sb3` files found inside stored zips.
#[utoipa::path(
    get,
    path = "/contents",
    tag = "Objects",
    operation_id = "ListProjectFiles",
    responses(
        (status = 200, description = "Names of nested .sb3 files"),
        (status = 404, description = "No .sb3 files found"),
        (status = 500, description = "Listing failed")
    )
)]
pub async fn list_project_files(state: Arc<AppState>) -> Result<Response, ApiError> {
    let outcome = index::index(&state.store, PROJECT_EXTENSION)
        .await
        .map_err(|e| {
            state
                .store
                .log()
                .error(format!("Error listing .sb3 files: {e}"));
            ApiError::from(e)
        })?;

    match outcome {
        IndexOutcome::Entries(sb3_files) => {
            Ok((StatusCode::OK, Json(ProjectListing { sb3_files })).into_response())
        }
        IndexOutcome::Empty => Err(ApiError::NotFound(
            "No .sb3 files found in recent ZIPs.".to_string(),
        )),
    }
}
