//! Axum router construction and route mapping.
//!
//! The [`app`] function wires the public endpoints to their handlers and
//! returns a ready-to-serve [`axum::Router`].  [`admin_app`] builds the
//! separate admin router that exposes `/metrics` and `/openapi.json`.
//!
//! Only three paths exist on the public listener.  Every method a path
//! does not implement is answered with `405`, as is every unknown path;
//! the framework's default `404` for unmatched routes is never returned.

use axum::{
    body::{Body, HttpBody},
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, RawQuery, State},
    http::{header, HeaderValue, Method, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::pin::Pin;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use utoipa::OpenApi;

use crate::errors::ApiError;
use crate::handlers::{file, health};
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// `Cache-Control` value attached to every response.
pub const CACHE_CONTROL_VALUE: &str = "no-cache, no-store, must-revalidate";

/// `Pragma` value attached to every response.
pub const PRAGMA_VALUE: &str = "no-cache";

// -- OpenAPI specification ----------------------------------------------------

/// OpenAPI documentation for the fileshelf API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "fileshelf API",
        version = "0.1.0",
        description = "File upload, lookup and deletion backed by an object store"
    ),
    paths(
        crate::handlers::health::probe,
        crate::handlers::file::upload_file,
        crate::handlers::file::get_file,
        crate::handlers::file::delete_file,
    ),
    components(schemas(file::UploadResponse, file::FileResponse)),
    tags(
        (name = "Health", description = "Liveness probe"),
        (name = "File", description = "File operations"),
    )
)]
pub struct ApiDoc;

/// Build the public axum [`Router`].
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let max_upload_size = state.config.server.max_upload_size;

    Router::new()
        // GET also answers HEAD unless HEAD is registered explicitly.
        .route(
            "/healthz",
            get(handle_healthz)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/file",
            post(handle_upload_file).fallback(method_not_allowed),
        )
        .route(
            "/v1/file/:id",
            get(handle_get_file)
                .delete(handle_delete_file)
                .head(method_not_allowed)
                .fallback(method_not_allowed),
        )
        .fallback(method_not_allowed)
        // Application state shared across all handlers.
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        // gatekeeper_middleware is innermost (path allowlist).
        .layer(middleware::from_fn(gatekeeper_middleware))
        .layer(DefaultBodyLimit::max(max_upload_size))
        // no_cache_middleware wraps everything that can produce a response.
        .layer(middleware::from_fn(no_cache_middleware))
        .layer(TraceLayer::new_for_http())
        // metrics_middleware is outermost (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
}

/// Build the admin [`Router`] served on `observability.admin_port`.
pub fn admin_app() -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

// -- Gatekeeper --------------------------------------------------------------

/// Whether `path` is on the public allowlist.
fn is_allowed_path(path: &str) -> bool {
    path == "/healthz" || path == "/v1/file" || path.starts_with("/v1/file/")
}

/// Reject paths outside the allowlist with `405` before any handler runs.
async fn gatekeeper_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    if !is_allowed_path(req.uri().path()) {
        debug!(
            "Rejected {} {}: path not allowed",
            req.method(),
            req.uri().path()
        );
        return ApiError::MethodNotAllowed.into_response();
    }
    next.run(req).await
}

/// Attach the no-cache headers to every response, errors included.
async fn no_cache_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_VALUE),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static(PRAGMA_VALUE));
    response
}

/// Catch-all for unimplemented method/path combinations.
async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    warn!("Method {} not allowed on {}", method, uri.path());
    ApiError::MethodNotAllowed
}

/// Whether a request carries any body bytes.
///
/// Reads no further than the first non-empty data frame, so an oversized
/// body is detected without buffering it or tripping the upload limit.
/// A body that fails to stream counts as present.
async fn has_body(mut body: Body) -> bool {
    if body.is_end_stream() || body.size_hint().exact() == Some(0) {
        return false;
    }
    while let Some(frame) = std::future::poll_fn(|cx| Pin::new(&mut body).poll_frame(cx)).await {
        match frame {
            Ok(frame) => {
                if frame.data_ref().is_some_and(|data| !data.is_empty()) {
                    return true;
                }
            }
            Err(_) => return true,
        }
    }
    false
}

// -- Route handlers ------------------------------------------------------------

/// `GET /healthz`
async fn handle_healthz(
    State(state): State<Arc<AppState>>,
    RawQuery(raw_query): RawQuery,
    body: Body,
) -> Result<StatusCode, ApiError> {
    health::probe(&state, raw_query.as_deref(), has_body(body).await).await?;
    Ok(StatusCode::OK)
}

/// `POST /v1/file`
async fn handle_upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        warn!("Upload rejected: {}", rejection.body_text());
        ApiError::bad_request_with(rejection.body_text())
    })?;
    let upload = file::read_file_part(multipart).await?;
    let uploaded = file::upload_file(&state, upload).await?;
    Ok((StatusCode::CREATED, Json(uploaded)).into_response())
}

/// `GET /v1/file/:id`
async fn handle_get_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body,
) -> Result<Response, ApiError> {
    let record = file::get_file(&state, &id, has_body(body).await).await?;
    Ok(Json(record).into_response())
}

/// `DELETE /v1/file/:id`
async fn handle_delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Body,
) -> Result<StatusCode, ApiError> {
    file::delete_file(&state, &id, has_body(body).await).await?;
    Ok(StatusCode::NO_CONTENT)
}
