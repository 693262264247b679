//! fileshelf library -- a small file-hosting API.
//!
//! Files are stored as blobs in an object store while a metadata store
//! keeps one record per file plus a log of liveness probes.  This crate
//! provides the HTTP layer, the two storage seams, and their backends.

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod metadata;
pub mod metrics;
pub mod server;
pub mod storage;

use crate::config::Config;
use crate::metadata::store::MetadataStore;
use crate::storage::backend::StorageBackend;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Metadata store (SQLite or in-memory).
    pub metadata: Arc<dyn MetadataStore>,
    /// Object storage backend (local filesystem, S3, or in-memory).
    pub storage: Arc<dyn StorageBackend>,
}
