//! Prometheus metrics for RepoStore.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "repostore_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "repostore_http_request_duration_seconds";

/// Physical requests sent to the upstream API (counter). Labels: method, status.
pub const UPSTREAM_REQUESTS_TOTAL: &str = "repostore_upstream_requests_total";

/// Credential rotations (counter).
pub const CREDENTIAL_ROTATIONS_TOTAL: &str = "repostore_credential_rotations_total";

/// Uploaded files (counter). Labels: type, status.
pub const UPLOADS_TOTAL: &str = "repostore_uploads_total";

/// Objects written into exported bundles (counter).
pub const BUNDLE_OBJECTS_TOTAL: &str = "repostore_bundle_objects_total";

/// Nested entries returned by index scans (counter).
pub const INDEXED_ENTRIES_TOTAL: &str = "repostore_indexed_entries_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {e}"))?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(UPSTREAM_REQUESTS_TOTAL, "Requests sent to the upstream API");
    describe_counter!(CREDENTIAL_ROTATIONS_TOTAL, "Upstream credential rotations");
    describe_counter!(UPLOADS_TOTAL, "Uploaded files by type and outcome");
    describe_counter!(BUNDLE_OBJECTS_TOTAL, "Objects written into exported bundles");
    describe_counter!(INDEXED_ENTRIES_TOTAL, "Nested entries returned by index scans");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Map a request path to a bounded label value.
///
/// Known routes keep their path; anything else collapses to `/other` so
/// scanners cannot inflate label cardinality.
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/upload/compiler" => "/upload/compiler",
        "/uploads/files" => "/uploads/files",
        "/contents" => "/contents",
        "/status" => "/status",
        "/health" => "/health",
        "/openapi.json" => "/openapi.json",
        _ => "/other",
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
