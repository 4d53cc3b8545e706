//! Axum router construction and route mapping.
//!
//! The [`app`] function wires every endpoint to its handler and returns a
//! ready-to-serve [`axum::Router`].  Handlers in [`crate::handlers`] take
//! plain arguments; the thin `handle_*` functions here do the extraction.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, ApiError};
use crate::handlers::{download, status, upload};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the RepoStore API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "RepoStore API",
        version = "0.1.0",
        description = "Object store backed by a repository contents API"
    ),
    paths(
        health_check,
        crate::handlers::upload::upload_files,
        crate::handlers::download::download_bundle,
        crate::handlers::download::list_project_files,
        crate::handlers::status::status,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Objects", description = "Upload, bundle download, and nested listing"),
        (name = "Status", description = "Upload log"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes.
pub fn app(state: Arc<AppState>) -> Router {
    let openapi = ApiDoc::openapi();
    let observability = state.config.observability.clone();
    let max_body_size = state.config.server.max_body_size;

    let mut router = Router::new()
        .route("/upload/compiler", post(handle_upload))
        .route("/uploads/files", get(handle_download))
        .route("/contents", get(handle_contents))
        .route("/status", get(handle_status))
        .route(
            "/openapi.json",
            get(move || {
                let doc = openapi.clone();
                async move { Json(doc) }
            }),
        );

    if observability.health_check {
        router = router.route("/health", get(health_check));
    }
    if observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    let mut router = router
        .with_state(state)
        // Inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    if observability.metrics {
        router = router.layer(middleware::from_fn(metrics_middleware));
    }

    router.layer(DefaultBodyLimit::max(max_body_size))
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id`, `date`, and `server` to every response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert("date", value);
    }
    headers.insert("server", HeaderValue::from_static("RepoStore"));

    response
}

// -- Health check -------------------------------------------------------------

/// `GET /health` -- liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

// -- Dispatch -----------------------------------------------------------------

/// `POST /upload/compiler`
async fn handle_upload(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let multipart = multipart.map_err(|e| {
        debug!("rejecting non-multipart upload: {e}");
        ApiError::BadRequest("No files in request".to_string())
    })?;
    let files = upload::collect_files(multipart).await?;
    upload::upload_files(state, files).await
}

/// `GET /uploads/files`
async fn handle_download(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    download::download_bundle(state).await
}

/// `GET /contents`
async fn handle_contents(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    download::list_project_files(state).await
}

/// `GET /status`
async fn handle_status(State(state): State<Arc<AppState>>) -> Response {
    status::status(state).await
}
