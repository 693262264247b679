//! File API handlers: upload, retrieval, and deletion.
//!
//! Upload and deletion touch two independently failing systems, the
//! object store and the metadata store.  Both are ordered so that a
//! metadata record never points at a blob that is not there:
//!
//! - upload writes the blob first, then the record; if the record cannot
//!   be written the blob is deleted again (a single compensating delete,
//!   never retried);
//! - deletion removes the blob first and only then the record; if the
//!   blob delete fails the record stays.

use std::time::Instant;

use axum::extract::Multipart;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::errors::{ApiError, MetadataError};
use crate::metadata::store::FileRecord;
use crate::metrics::{record_db, record_storage, ApiTimer};
use crate::AppState;

/// Multipart field that carries the upload.
pub const FILE_FIELD: &str = "file";

/// Content type used when the client does not declare one.
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A file payload pulled out of a multipart request.
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Client-supplied filename.
    pub filename: String,
    /// Declared MIME type of the part.
    pub content_type: String,
    /// Raw bytes.
    pub data: Bytes,
}

/// Body of a successful upload (`201 Created`).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadResponse {
    /// Object-store key of the blob.
    pub file_name: String,
    /// Identifier for later `GET`/`DELETE` calls.
    pub file_id: String,
    /// Object-store URL of the blob.
    pub file_url: String,
    /// Size in bytes.
    pub size: u64,
    /// Last-modified time reported by the object store.
    pub upload_date: DateTime<Utc>,
    /// Human-readable confirmation.
    pub message: String,
}

/// Body of a successful lookup (`200 OK`).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileResponse {
    pub id: String,
    pub file_name: String,
    pub file_url: String,
    pub size: u64,
    pub upload_date: DateTime<Utc>,
}

impl From<FileRecord> for FileResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            file_name: record.stored_name,
            file_url: record.url,
            size: record.size,
            upload_date: record.upload_date,
        }
    }
}

impl From<FileRecord> for UploadResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            file_name: record.stored_name,
            file_id: record.id,
            file_url: record.url,
            size: record.size,
            upload_date: record.upload_date,
            message: "File added".to_string(),
        }
    }
}

/// Pull the `file` part out of a multipart body.
///
/// Returns `Ok(None)` when the body has no part named `file` carrying a
/// filename.  Other parts are drained and ignored.
pub async fn read_file_part(mut multipart: Multipart) -> Result<Option<FileUpload>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Failed to read multipart body: {}", e);
        ApiError::bad_request_with(format!("Invalid multipart body: {e}"))
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let data = field.bytes().await.map_err(|e| {
            warn!("Failed to read uploaded file {}: {}", filename, e);
            ApiError::bad_request_with(format!("Failed to read file: {e}"))
        })?;
        return Ok(Some(FileUpload {
            filename,
            content_type,
            data,
        }));
    }
    Ok(None)
}

/// Best-effort removal of a blob that has no metadata record.
///
/// A failure is logged and otherwise swallowed: the caller already
/// reports the upload as failed.
async fn compensate_blob(state: &AppState, stored_name: &str) {
    let started = Instant::now();
    let result = state.storage.delete(stored_name).await;
    record_storage("delete_file", started.elapsed());
    match result {
        Ok(()) => info!("Deleted orphan blob {} after failed upload", stored_name),
        Err(e) => error!(
            "Failed to delete orphan blob {} after failed upload: {}",
            stored_name, e
        ),
    }
}

/// `POST /v1/file` -- Store a file and record its metadata.
#[utoipa::path(
    post,
    path = "/v1/file",
    tag = "File",
    operation_id = "UploadFile",
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 400, description = "No file in the request"),
        (status = 503, description = "Object store or metadata store unavailable")
    )
)]
pub async fn upload_file(
    state: &AppState,
    upload: Option<FileUpload>,
) -> Result<UploadResponse, ApiError> {
    let _timer = ApiTimer::start("upload_file");

    let Some(upload) = upload else {
        warn!("No file was provided in the request");
        return Err(ApiError::bad_request_with("No file provided"));
    };

    let file_id = uuid::Uuid::new_v4().to_string();
    let stored_name = format!("{file_id}_{}", upload.filename);

    // Phase 1: object store.  Nothing is persisted if the write fails.
    let started = Instant::now();
    if let Err(e) = state
        .storage
        .put(&stored_name, upload.data, &upload.content_type)
        .await
    {
        record_storage("upload_file", started.elapsed());
        error!("Failed to store blob {}: {}", stored_name, e);
        return Err(ApiError::ServiceUnavailable);
    }

    // Blob facts come from the store, not from the request.
    let blob = match state.storage.head(&stored_name).await {
        Ok(blob) => blob,
        Err(e) => {
            record_storage("upload_file", started.elapsed());
            error!("Failed to read back blob {}: {}", stored_name, e);
            compensate_blob(state, &stored_name).await;
            return Err(ApiError::ServiceUnavailable);
        }
    };
    record_storage("upload_file", started.elapsed());

    let record = FileRecord {
        id: file_id,
        url: state.storage.url(&stored_name),
        stored_name,
        size: blob.size,
        upload_date: blob.last_modified,
    };

    // Phase 2: metadata store, compensated on failure.
    let started = Instant::now();
    let result = state.metadata.insert_file(record.clone()).await;
    record_db("upload_file", started.elapsed());
    if let Err(e) = result {
        error!(
            "Failed to persist metadata for {}: {}",
            record.stored_name, e
        );
        compensate_blob(state, &record.stored_name).await;
        return Err(ApiError::ServiceUnavailable);
    }

    info!(
        "Uploaded file {} ({} bytes, {})",
        record.stored_name, record.size, blob.content_type
    );
    Ok(record.into())
}

/// `GET /v1/file/{id}` -- Return the stored metadata of a file.
#[utoipa::path(
    get,
    path = "/v1/file/{id}",
    tag = "File",
    operation_id = "GetFile",
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File metadata", body = FileResponse),
        (status = 400, description = "Request carried a body"),
        (status = 404, description = "File not found"),
        (status = 503, description = "Metadata store unavailable")
    )
)]
pub async fn get_file(
    state: &AppState,
    id: &str,
    has_body: bool,
) -> Result<FileResponse, ApiError> {
    let _timer = ApiTimer::start("get_file");

    if has_body {
        return Err(ApiError::bad_request());
    }

    let started = Instant::now();
    let result = state.metadata.get_file(id).await;
    record_db("get_file", started.elapsed());

    match result {
        Ok(Some(record)) => {
            info!("Retrieved metadata for file {}", id);
            Ok(record.into())
        }
        Ok(None) => {
            warn!("File {} not found", id);
            Err(ApiError::NotFound)
        }
        Err(MetadataError::Backend(e)) => {
            error!("Metadata store error while reading file {}: {}", id, e);
            Err(ApiError::ServiceUnavailable)
        }
        // Fail closed: an unreadable record is reported as absent.
        Err(e @ MetadataError::Decode { .. }) => {
            error!("Error retrieving metadata for file {}: {}", id, e);
            Err(ApiError::NotFound)
        }
    }
}

/// `DELETE /v1/file/{id}` -- Delete a file's blob, then its metadata.
#[utoipa::path(
    delete,
    path = "/v1/file/{id}",
    tag = "File",
    operation_id = "DeleteFile",
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 204, description = "File deleted"),
        (status = 400, description = "Request carried a body"),
        (status = 404, description = "File not found, or its blob could not be deleted"),
        (status = 503, description = "Metadata store unavailable")
    )
)]
pub async fn delete_file(state: &AppState, id: &str, has_body: bool) -> Result<(), ApiError> {
    let _timer = ApiTimer::start("delete_file");

    if has_body {
        return Err(ApiError::bad_request());
    }

    let started = Instant::now();
    let lookup = state.metadata.get_file(id).await;
    record_db("delete_file", started.elapsed());

    let record = match lookup {
        Ok(Some(record)) => record,
        Ok(None) => {
            warn!("File {} not found, skipping deletion", id);
            return Err(ApiError::NotFound);
        }
        Err(MetadataError::Backend(e)) => {
            error!("Metadata store error while looking up file {}: {}", id, e);
            return Err(ApiError::ServiceUnavailable);
        }
        Err(e @ MetadataError::Decode { .. }) => {
            error!("Error reading metadata for file {}: {}", id, e);
            return Err(ApiError::NotFound);
        }
    };

    // Phase 1: object store.  The record is kept if this fails.
    let started = Instant::now();
    let result = state.storage.delete(&record.stored_name).await;
    record_storage("delete_file", started.elapsed());
    if let Err(e) = result {
        error!("Failed to delete blob {}: {}", record.stored_name, e);
        return Err(ApiError::NotFound);
    }

    // Phase 2: metadata store.
    let started = Instant::now();
    let result = state.metadata.delete_file(id).await;
    record_db("delete_file", started.elapsed());
    match result {
        Ok(true) => {
            info!("Deleted file {} ({})", id, record.stored_name);
            Ok(())
        }
        Ok(false) => {
            warn!("File {} was removed concurrently", id);
            Err(ApiError::NotFound)
        }
        Err(e) => {
            error!(
                "Deleted blob {} but failed to delete its metadata: {}",
                record.stored_name, e
            );
            Err(ApiError::ServiceUnavailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::metadata::memory::MemoryMetadataStore;
    use crate::metadata::store::MetadataStore;
    use crate::storage::backend::StorageBackend;
    use crate::storage::memory::MemoryBackend;

    fn test_state() -> (AppState, Arc<MemoryMetadataStore>, Arc<MemoryBackend>) {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let storage = Arc::new(MemoryBackend::default());
        let state = AppState {
            config: Config::default(),
            metadata: metadata.clone(),
            storage: storage.clone(),
        };
        (state, metadata, storage)
    }

    fn upload(name: &str, data: &'static str) -> Option<FileUpload> {
        Some(FileUpload {
            filename: name.to_string(),
            content_type: "text/plain".to_string(),
            data: Bytes::from(data),
        })
    }

    #[tokio::test]
    async fn test_upload_then_get() {
        let (state, _, storage) = test_state();
        let uploaded = upload_file(&state, upload("notes.txt", "hello"))
            .await
            .unwrap();

        assert_eq!(uploaded.file_name, format!("{}_notes.txt", uploaded.file_id));
        assert_eq!(uploaded.size, 5);
        assert_eq!(uploaded.message, "File added");
        assert_eq!(uploaded.file_url, storage.url(&uploaded.file_name));

        let fetched = get_file(&state, &uploaded.file_id, false).await.unwrap();
        assert_eq!(fetched.id, uploaded.file_id);
        assert_eq!(fetched.file_name, uploaded.file_name);
        assert_eq!(fetched.size, uploaded.size);
        assert_eq!(fetched.upload_date, uploaded.upload_date);
    }

    #[tokio::test]
    async fn test_upload_date_comes_from_store() {
        let (state, _, storage) = test_state();
        let uploaded = upload_file(&state, upload("a.txt", "x")).await.unwrap();
        let blob = storage.head(&uploaded.file_name).await.unwrap();
        assert_eq!(uploaded.upload_date, blob.last_modified);
    }

    #[tokio::test]
    async fn test_upload_ids_are_unique() {
        let (state, _, _) = test_state();
        let a = upload_file(&state, upload("same.txt", "1")).await.unwrap();
        let b = upload_file(&state, upload("same.txt", "1")).await.unwrap();
        assert_ne!(a.file_id, b.file_id);
        assert_ne!(a.file_name, b.file_name);
    }

    #[tokio::test]
    async fn test_upload_without_file_is_bad_request() {
        let (state, metadata, storage) = test_state();
        let err = upload_file(&state, None).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { message: Some(_) }));
        assert_eq!(metadata.count_files().await.unwrap(), 0);
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let (state, _, _) = test_state();
        let err = get_file(&state, "nope", false).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn test_get_with_body_is_bad_request() {
        let (state, _, _) = test_state();
        let err = get_file(&state, "nope", true).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { message: None }));
    }

    #[tokio::test]
    async fn test_delete_removes_both_halves() {
        let (state, metadata, storage) = test_state();
        let uploaded = upload_file(&state, upload("a.txt", "abc")).await.unwrap();

        delete_file(&state, &uploaded.file_id, false).await.unwrap();
        assert_eq!(metadata.count_files().await.unwrap(), 0);
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_found() {
        let (state, _, _) = test_state();
        let uploaded = upload_file(&state, upload("a.txt", "abc")).await.unwrap();
        delete_file(&state, &uploaded.file_id, false).await.unwrap();
        let err = delete_file(&state, &uploaded.file_id, false).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_with_body_is_bad_request() {
        let (state, metadata, _) = test_state();
        let uploaded = upload_file(&state, upload("a.txt", "abc")).await.unwrap();
        let err = delete_file(&state, &uploaded.file_id, true).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
        assert_eq!(metadata.count_files().await.unwrap(), 1);
    }
}
