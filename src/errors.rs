//! Error types.
//!
//! [`StoreError`] is the domain error produced by the credential,
//! transport, and storage layers.  Its variants follow the failure
//! taxonomy of the service: configuration, authorization, malformed
//! upstream responses, and opaque transport failures.  Not-found is
//! never an error here; the adapter models it as `Option`.
//!
//! [`ApiError`] is what HTTP handlers return.  It implements
//! [`axum::response::IntoResponse`] and renders the JSON error bodies
//! clients expect.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Failures of the remote-backed object store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required credential is absent from the environment.
    #[error("Missing {var} environment variable.")]
    MissingCredential { var: String },

    /// An object name that does not address a single file under the
    /// contents root.
    #[error("invalid object name {name:?}")]
    InvalidName { name: String },

    /// The upstream kept rejecting credentials after a rotation.
    #[error("upstream rejected the configured credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    /// A listing returned an error-shaped payload; `message` is the
    /// upstream's own text, kept verbatim.
    #[error("{message}")]
    Listing { message: String },

    /// Any other non-success upstream response.
    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The upstream answered with something we cannot interpret.
    #[error("malformed upstream response: {0}")]
    Malformed(String),

    /// Object content is not base64 or is empty.
    #[error("object {name} has unsupported encoding {encoding:?}")]
    UnsupportedEncoding {
        name: String,
        encoding: Option<String>,
    },

    /// Object content claims base64 but does not decode.
    #[error("object {name} has invalid base64 content: {source}")]
    Decode {
        name: String,
        #[source]
        source: base64::DecodeError,
    },

    /// Reading or writing a zip container failed.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Transport failures and anything else unexpected.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Internal(e.into())
    }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 400 with `{"error": ...}`.
    #[error("{0}")]
    BadRequest(String),

    /// 404 with `{"message": ...}`.
    #[error("{0}")]
    NotFound(String),

    /// 500 with `{"error": ...}`.
    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl ApiError {
    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ApiError::NotFound(message) => json!({ "message": message }),
            ApiError::BadRequest(error) | ApiError::Internal(error) => json!({ "error": error }),
        };
        (status, Json(body)).into_response()
    }
}
