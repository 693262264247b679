//! Local filesystem storage backend.
//!
//! Blobs are stored as flat files under a configurable root directory.
//! The key is used directly as a relative path.  The content type of each
//! blob is kept in a sidecar file under `.meta/`.
//!
//! All writes follow crash-only design: write to temp file, fsync, rename.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;

use super::backend::{BlobMetadata, StorageBackend};

/// Content type reported when a blob has no sidecar.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Stores blobs on the local filesystem.
pub struct LocalBackend {
    /// Root directory for all stored blobs.
    root: PathBuf,
}

impl LocalBackend {
    /// Create a new `LocalBackend` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join(".tmp"))?;
        std::fs::create_dir_all(root.join(".meta"))?;
        // Absolute root so that generated URLs are fully qualified.
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    /// Reject keys that would escape the root directory.
    fn check_key(key: &str) -> anyhow::Result<()> {
        if key.is_empty() {
            anyhow::bail!("Empty storage key");
        }
        for component in Path::new(key).components() {
            match component {
                Component::Normal(_) => {}
                _ => anyhow::bail!("Path traversal detected in storage key: {key}"),
            }
        }
        if key.starts_with(".tmp") || key.starts_with(".meta") {
            anyhow::bail!("Reserved storage key: {key}");
        }
        Ok(())
    }

    /// Resolve a key to the blob's absolute path.
    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        Self::check_key(key)?;
        Ok(self.root.join(key))
    }

    /// Resolve a key to its content-type sidecar path.
    fn sidecar(&self, key: &str) -> anyhow::Result<PathBuf> {
        Self::check_key(key)?;
        Ok(self.root.join(".meta").join(key))
    }

    /// Generate a temp file path under .tmp/ for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(".tmp").join(format!("tmp-{id}"))
    }

    /// Remove directories left empty above `path`, stopping at `stop`.
    ///
    /// Keys containing `/` create nested directories on write; a non-empty
    /// directory ends the walk.
    fn prune_empty_parents(&self, path: &Path, stop: &Path) {
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == stop || !current.starts_with(stop) {
                break;
            }
            if std::fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }

    /// Crash-only write: temp file, fsync, rename over `final_path`.
    fn write_atomic(&self, final_path: &Path, data: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.temp_path();
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, final_path)?;
        Ok(())
    }
}

impl StorageBackend for LocalBackend {
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            let final_path = self.resolve(&key)?;
            let sidecar_path = self.sidecar(&key)?;
            self.write_atomic(&sidecar_path, content_type.as_bytes())?;
            self.write_atomic(&final_path, &data)?;
            Ok(())
        })
    }

    fn head(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<BlobMetadata>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.resolve(&key)?;
            if !path.is_file() {
                anyhow::bail!("Object not found at key: {key}");
            }
            let meta = std::fs::metadata(&path)?;
            let last_modified: DateTime<Utc> = meta.modified()?.into();
            let content_type = std::fs::read_to_string(self.sidecar(&key)?)
                .unwrap_or_else(|_| DEFAULT_CONTENT_TYPE.to_string());
            Ok(BlobMetadata {
                size: meta.len(),
                content_type,
                last_modified,
            })
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.resolve(&key)?;
            let sidecar_path = self.sidecar(&key)?;

            // Idempotent: if the file doesn't exist, that's fine.
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            if sidecar_path.exists() {
                std::fs::remove_file(&sidecar_path)?;
            }
            self.prune_empty_parents(&path, &self.root);
            self.prune_empty_parents(&sidecar_path, &self.root.join(".meta"));
            Ok(())
        })
    }

    fn url(&self, key: &str) -> String {
        format!("file://{}", self.root.join(key).display())
    }
}

// ── Tests ───────────────────────────────────────────────────────────
