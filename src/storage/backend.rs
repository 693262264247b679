//! Abstract storage backend trait.
//!
//! Every object store client must implement [`StorageBackend`].  Failures
//! are reported as opaque `anyhow` errors: callers only distinguish
//! success from failure.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Blob-level facts as reported by the object store.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobMetadata {
    /// Stored size in bytes.
    pub size: u64,
    /// MIME content type recorded with the blob.
    pub content_type: String,
    /// Last-modified time according to the object store.
    pub last_modified: DateTime<Utc>,
}

/// Async object storage contract.
pub trait StorageBackend: Send + Sync + 'static {
    /// Write `data` under `key`, replacing any existing blob.
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Fetch the stored metadata of the blob at `key`.
    fn head(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<BlobMetadata>> + Send + '_>>;

    /// Delete the blob at `key`.  Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Fully-qualified URL of the blob at `key`.
    fn url(&self, key: &str) -> String;
}
