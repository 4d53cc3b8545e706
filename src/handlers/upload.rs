//! Upload handler: persist multipart files into the remote store.

use std::sync::Arc;

use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::errors::ApiError;
use crate::storage::contents::CategoryTag;
use crate::AppState;

/// Multipart field carrying files.
pub const FILE_FIELD: &str = "file";

/// One file taken from the request body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied filename; `None` or empty means "skip".
    pub filename: Option<String>,
    pub data: Bytes,
}

/// Per-file outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadStatus {
    #[serde(rename = "uploaded")]
    Uploaded,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "skipped - no filename")]
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub filename: Option<String>,
    pub status: UploadStatus,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<CategoryTag>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub results: Vec<UploadResult>,
}

/// Drain every `file` field from a multipart body.  Other fields are ignored.
pub async fn collect_files(mut multipart: Multipart) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?;
        files.push(UploadedFile { filename, data });
    }
    Ok(files)
}

/// `POST /upload/compiler` -- store every uploaded file.
///
/// Files are processed one after another; a failure or a missing
/// filename only affects that file's entry.  The batch answers 200 as
/// long as at least one file part was present.
#[utoipa::path(
    post,
    path = "/upload/compiler",
    tag = "Objects",
    operation_id = "UploadFiles",
    responses(
        (status = 200, description = "Per-file results"),
        (status = 400, description = "No files in request")
    )
)]
pub async fn upload_files(
    state: Arc<AppState>,
    files: Vec<UploadedFile>,
) -> Result<Response, ApiError> {
    if files.is_empty() {
        return Err(ApiError::BadRequest("No files in request".to_string()));
    }

    let mut results = Vec::with_capacity(files.len());
    for file in files {
        let Some(filename) = file.filename.filter(|name| !name.is_empty()) else {
            results.push(UploadResult {
                filename: None,
                status: UploadStatus::Skipped,
                kind: None,
            });
            continue;
        };

        let tag = CategoryTag::from_filename(&filename);
        debug!(%filename, %tag, size = file.data.len(), "uploading");
        let ok = state.store.put(&filename, &file.data, tag).await;

        results.push(UploadResult {
            filename: Some(filename),
            status: if ok {
                UploadStatus::Uploaded
            } else {
                UploadStatus::Failed
            },
            kind: Some(tag),
        });
    }

    Ok((StatusCode::OK, Json(UploadResponse { results })).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stub_state, StubContents};

    fn file(name: Option<&str>, data: &'static [u8]) -> UploadedFile {
        UploadedFile {
            filename: name.map(String::from),
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn test_result_serialization() {
        let skipped = serde_json::to_value(UploadResult {
            filename: None,
            status: UploadStatus::Skipped,
            kind: None,
        })
        .unwrap();
        assert_eq!(
            skipped,
            serde_json::json!({"filename": null, "status": "skipped - no filename"})
        );

        let uploaded = serde_json::to_value(UploadResult {
            filename: Some("a.sb3".to_string()),
            status: UploadStatus::Uploaded,
            kind: Some(CategoryTag::Sb3),
        })
        .unwrap();
        assert_eq!(
            uploaded,
            serde_json::json!({"filename": "a.sb3", "status": "uploaded", "type": "sb3"})
        );
    }

    #[tokio::test]
    async fn test_no_files_is_bad_request() {
        let state = stub_state(StubContents::new());
        let err = upload_files(state, Vec::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_failed_upload_is_reported_per_file() {
        let stub = StubContents::new();
        stub.fail_fetch("bad.png");
        let state = stub_state(stub.clone());

        let resp = upload_files(
            state,
            vec![file(Some("bad.png"), b"x"), file(Some("ok.txt"), b"y")],
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(stub.content_of("bad.png").is_none());
        assert_eq!(stub.content_of("ok.txt").unwrap(), b"y");
    }
}
