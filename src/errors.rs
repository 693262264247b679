//! API error types.
//!
//! Every backend failure is caught at the handler boundary and mapped to
//! one of the [`ApiError`] variants; nothing reaches the client as a raw
//! internal error.  The enum implements [`axum::response::IntoResponse`]
//! so handlers can simply return `Err(ApiError::NotFound)`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Client-visible error kinds.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or disallowed input: a body where none is allowed, a
    /// query string on the health probe, a missing file payload.
    #[error("Bad request")]
    BadRequest {
        /// Optional detail rendered as `{"detail": ...}`.
        message: Option<String>,
    },

    /// No such record, or an ambiguous read/delete failure reported
    /// conservatively as absence.
    #[error("Not found")]
    NotFound,

    /// A confirmed backend outage.
    #[error("Service unavailable")]
    ServiceUnavailable,

    /// Path/method combination that is not implemented.
    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl ApiError {
    /// A `BadRequest` without a response body.
    pub fn bad_request() -> Self {
        ApiError::BadRequest { message: None }
    }

    /// A `BadRequest` carrying a detail message.
    pub fn bad_request_with(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: Some(message.into()),
        }
    }

    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

/// JSON body of a `400` that carries a detail message.
#[derive(Debug, Serialize)]
struct ErrorDetail {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::BadRequest {
                message: Some(detail),
            } => (status, Json(ErrorDetail { detail })).into_response(),
            // Every other error carries an empty body.
            _ => status.into_response(),
        }
    }
}

/// Errors raised by a [`MetadataStore`](crate::metadata::store::MetadataStore).
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The database driver, connection, or a constraint failed.
    #[error("metadata backend error: {0}")]
    Backend(#[from] anyhow::Error),

    /// A stored row exists but cannot be shaped into a record.
    #[error("metadata record {id} is unreadable: {reason}")]
    Decode { id: String, reason: String },
}

impl From<rusqlite::Error> for MetadataError {
    fn from(err: rusqlite::Error) -> Self {
        MetadataError::Backend(err.into())
    }
}
