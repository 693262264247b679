//! Abstract metadata store trait.
//!
//! Any metadata backend must implement [`MetadataStore`].  The trait
//! uses `async_trait`-style methods (manual desugaring with pinned
//! futures) so it can be used with both SQLite and in-memory stores.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

use crate::errors::MetadataError;

// ── Record types ───────────────────────────────────────────────────

/// Persisted metadata of one uploaded blob.
///
/// A record exists if and only if a blob exists under `stored_name`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    /// Service-generated identifier (primary key).
    pub id: String,
    /// Object-store key: `{id}_{original filename}`.
    pub stored_name: String,
    /// Fully-qualified object-store URL.
    pub url: String,
    /// Size in bytes as reported by the object store.
    pub size: u64,
    /// Last-modified time as reported by the object store.
    pub upload_date: DateTime<Utc>,
}

/// One successful liveness probe against the database.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckRecord {
    /// Auto-increment identifier.
    pub id: i64,
    /// When the probe was recorded.
    pub datetime: DateTime<Utc>,
}

/// Shorthand for the boxed futures returned by [`MetadataStore`].
pub type MetadataFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, MetadataError>> + Send + 'a>>;

// ── Trait ───────────────────────────────────────────────────────────

/// Async metadata store contract.
///
/// Every write runs in its own transaction: either it commits, or it is
/// rolled back and an error is returned.
pub trait MetadataStore: Send + Sync + 'static {
    /// Insert a new file record.  Fails if the id already exists.
    fn insert_file(&self, record: FileRecord) -> MetadataFuture<'_, ()>;

    /// Get a file record by id.
    fn get_file(&self, id: &str) -> MetadataFuture<'_, Option<FileRecord>>;

    /// Delete a file record by id.  Returns whether a record was removed.
    fn delete_file(&self, id: &str) -> MetadataFuture<'_, bool>;

    /// Count the stored file records.
    fn count_files(&self) -> MetadataFuture<'_, u64>;

    /// Append a health check row and return it.
    fn record_health_check(&self) -> MetadataFuture<'_, HealthCheckRecord>;
}
