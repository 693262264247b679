//! In-memory storage backend.
//!
//! Blobs are held in a `tokio::sync::RwLock<HashMap<...>>`.  Nothing
//! survives a restart, so this backend suits tests and throwaway
//! deployments.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::backend::{BlobMetadata, StorageBackend};

/// A blob plus the facts recorded when it was written.
#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// In-memory storage backend.
#[derive(Default)]
pub struct MemoryBackend {
    /// key -> blob.
    blobs: tokio::sync::RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryBackend {
    /// Create an empty `MemoryBackend`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently stored.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Whether no blobs are stored.
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            let blob = StoredBlob {
                data,
                content_type,
                last_modified: Utc::now(),
            };
            self.blobs.write().await.insert(key, blob);
            Ok(())
        })
    }

    fn head(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<BlobMetadata>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            match blobs.get(&key) {
                Some(blob) => Ok(BlobMetadata {
                    size: blob.data.len() as u64,
                    content_type: blob.content_type.clone(),
                    last_modified: blob.last_modified,
                }),
                None => anyhow::bail!("Object not found at key: {key}"),
            }
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            self.blobs.write().await.remove(&key);
            Ok(())
        })
    }

    fn url(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}

// ── Tests ───────────────────────────────────────────────────────────
