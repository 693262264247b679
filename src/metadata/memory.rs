//! In-memory metadata store.
//!
//! Records live in `tokio::sync::RwLock` maps and vanish on restart.
//! Pairs with the in-memory storage backend for tests and throwaway
//! deployments.

use std::collections::HashMap;

use chrono::Utc;

use super::store::{FileRecord, HealthCheckRecord, MetadataFuture, MetadataStore};
use crate::errors::MetadataError;

/// Volatile metadata store.
#[derive(Default)]
pub struct MemoryMetadataStore {
    /// id -> record.
    files: tokio::sync::RwLock<HashMap<String, FileRecord>>,
    /// Append-only probe log.
    health_checks: tokio::sync::RwLock<Vec<HealthCheckRecord>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn insert_file(&self, record: FileRecord) -> MetadataFuture<'_, ()> {
        Box::pin(async move {
            let mut files = self.files.write().await;
            if files.contains_key(&record.id) {
                return Err(MetadataError::Backend(anyhow::anyhow!(
                    "duplicate file id: {}",
                    record.id
                )));
            }
            files.insert(record.id.clone(), record);
            Ok(())
        })
    }

    fn get_file(&self, id: &str) -> MetadataFuture<'_, Option<FileRecord>> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.files.read().await.get(&id).cloned()) })
    }

    fn delete_file(&self, id: &str) -> MetadataFuture<'_, bool> {
        let id = id.to_string();
        Box::pin(async move { Ok(self.files.write().await.remove(&id).is_some()) })
    }

    fn count_files(&self) -> MetadataFuture<'_, u64> {
        Box::pin(async move { Ok(self.files.read().await.len() as u64) })
    }

    fn record_health_check(&self) -> MetadataFuture<'_, HealthCheckRecord> {
        Box::pin(async move {
            let mut checks = self.health_checks.write().await;
            let record = HealthCheckRecord {
                id: checks.len() as i64 + 1,
                datetime: Utc::now(),
            };
            checks.push(record.clone());
            Ok(record)
        })
    }
}
