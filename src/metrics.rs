//! Prometheus metrics for fileshelf.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, per-operation timers, and the `/metrics` endpoint
//! handler served on the admin listener.
//!
//! Recording never affects control flow: without an installed recorder
//! every macro call is a no-op.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "fileshelf_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "fileshelf_http_request_duration_seconds";

/// Completed API operations (counter). Labels: operation.
pub const API_OPERATIONS_TOTAL: &str = "fileshelf_api_operations_total";

/// API operation latency in seconds (histogram). Labels: operation.
pub const API_OPERATION_DURATION_SECONDS: &str = "fileshelf_api_operation_duration_seconds";

/// Metadata query latency in seconds (histogram). Labels: query.
pub const DB_QUERY_DURATION_SECONDS: &str = "fileshelf_db_query_duration_seconds";

/// Object-store call latency in seconds (histogram). Labels: operation.
pub const STORAGE_OPERATION_DURATION_SECONDS: &str = "fileshelf_storage_operation_duration_seconds";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times. Returns a reference to the global handle.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
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
    describe_counter!(API_OPERATIONS_TOTAL, "Completed API operations by type");
    describe_histogram!(
        API_OPERATION_DURATION_SECONDS,
        "API operation latency in seconds"
    );
    describe_histogram!(
        DB_QUERY_DURATION_SECONDS,
        "Metadata store query latency in seconds"
    );
    describe_histogram!(
        STORAGE_OPERATION_DURATION_SECONDS,
        "Object store call latency in seconds"
    );
}

// -- Per-operation timers -----------------------------------------------------

/// Record one completed API operation and its latency.
pub fn record_api(operation: &'static str, elapsed: Duration) {
    counter!(API_OPERATIONS_TOTAL, "operation" => operation).increment(1);
    histogram!(API_OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// Record the latency of one metadata store query.
pub fn record_db(query: &'static str, elapsed: Duration) {
    histogram!(DB_QUERY_DURATION_SECONDS, "query" => query).record(elapsed.as_secs_f64());
}

/// Record the latency of one object store call.
pub fn record_storage(operation: &'static str, elapsed: Duration) {
    histogram!(STORAGE_OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// Records an API operation when dropped, so every exit path of a
/// handler is counted.
pub struct ApiTimer {
    operation: &'static str,
    start: Instant,
}

impl ApiTimer {
    /// Start timing `operation`.
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for ApiTimer {
    fn drop(&mut self) {
        record_api(self.operation, self.start.elapsed());
    }
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Must be the outermost layer so it captures the full request lifecycle,
/// including requests rejected by the gatekeeper.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
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

/// Normalize an actual request path to a route template for metric labels.
///
/// This prevents high-cardinality labels from file ids and probing clients.
///
/// Examples:
/// - `/healthz` -> `/healthz`
/// - `/v1/file` -> `/v1/file`
/// - `/v1/file/3f2a...` -> `/v1/file/{id}`
/// - `/anything/else` -> `/{other}`
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/healthz" => "/healthz",
        "/v1/file" => "/v1/file",
        p if p.starts_with("/v1/file/") => "/v1/file/{id}",
        _ => "/{other}",
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
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
