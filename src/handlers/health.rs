//! Liveness probe.
//!
//! Every accepted probe appends a row to the metadata store, so a `200`
//! proves the metadata store accepted a write just now.

use std::time::Instant;

use tracing::{debug, error, warn};

use crate::errors::ApiError;
use crate::metrics::{record_db, ApiTimer};
use crate::AppState;

/// `GET /healthz` -- Record a health check and report liveness.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Health",
    operation_id = "Healthz",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 400, description = "Request carried a body or a query string"),
        (status = 503, description = "Metadata store unavailable")
    )
)]
pub async fn probe(state: &AppState, query: Option<&str>, has_body: bool) -> Result<(), ApiError> {
    let _timer = ApiTimer::start("get_healthz");

    if query.is_some_and(|q| !q.is_empty()) {
        warn!("Health check rejected: query string present");
        return Err(ApiError::bad_request());
    }
    if has_body {
        warn!("Health check rejected: request body present");
        return Err(ApiError::bad_request());
    }

    let started = Instant::now();
    let result = state.metadata.record_health_check().await;
    record_db("get_healthz", started.elapsed());

    match result {
        Ok(check) => {
            debug!("Health check {} recorded at {}", check.id, check.datetime);
            Ok(())
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            Err(ApiError::ServiceUnavailable)
        }
    }
}
