//! End-to-end tests for the public router.
//!
//! Each test drives `fileshelf::server::app` with `oneshot` against
//! in-memory backends wrapped in fault-injecting, call-counting doubles.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use fileshelf::config::Config;
use fileshelf::errors::MetadataError;
use fileshelf::metadata::memory::MemoryMetadataStore;
use fileshelf::metadata::store::{FileRecord, HealthCheckRecord, MetadataFuture, MetadataStore};
use fileshelf::storage::backend::{BlobMetadata, StorageBackend};
use fileshelf::storage::memory::MemoryBackend;
use fileshelf::AppState;

const BOUNDARY: &str = "fileshelf-test-boundary";

// -- Test doubles ---------------------------------------------------------------

type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

fn store_failure<'a, T: Send + 'a>(what: &'static str) -> StoreFuture<'a, T> {
    Box::pin(async move { Err(anyhow::anyhow!("injected {what} failure")) })
}

fn metadata_failure<'a, T: Send + 'a>(err: MetadataError) -> MetadataFuture<'a, T> {
    Box::pin(async move { Err(err) })
}

fn backend_error(what: &str) -> MetadataError {
    MetadataError::Backend(anyhow::anyhow!("injected {what} failure"))
}

#[derive(Default)]
struct FaultyStorage {
    inner: MemoryBackend,
    fail_put: AtomicBool,
    fail_head: AtomicBool,
    fail_delete: AtomicBool,
    puts: AtomicUsize,
    heads: AtomicUsize,
    deletes: AtomicUsize,
}

impl FaultyStorage {
    fn calls(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
            + self.heads.load(Ordering::SeqCst)
            + self.deletes.load(Ordering::SeqCst)
    }
}

impl StorageBackend for FaultyStorage {
    fn put(&self, key: &str, data: Bytes, content_type: &str) -> StoreFuture<'_, ()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_put.load(Ordering::SeqCst) {
            return store_failure("put");
        }
        self.inner.put(key, data, content_type)
    }

    fn head(&self, key: &str) -> StoreFuture<'_, BlobMetadata> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        if self.fail_head.load(Ordering::SeqCst) {
            return store_failure("head");
        }
        self.inner.head(key)
    }

    fn delete(&self, key: &str) -> StoreFuture<'_, ()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return store_failure("delete");
        }
        self.inner.delete(key)
    }

    fn url(&self, key: &str) -> String {
        self.inner.url(key)
    }
}

#[derive(Default)]
struct FaultyMetadata {
    inner: MemoryMetadataStore,
    fail_insert: AtomicBool,
    fail_get: AtomicBool,
    corrupt_get: AtomicBool,
    fail_delete: AtomicBool,
    fail_health: AtomicBool,
    calls: AtomicUsize,
}

impl FaultyMetadata {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetadataStore for FaultyMetadata {
    fn insert_file(&self, record: FileRecord) -> MetadataFuture<'_, ()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_insert.load(Ordering::SeqCst) {
            return metadata_failure(backend_error("insert"));
        }
        self.inner.insert_file(record)
    }

    fn get_file(&self, id: &str) -> MetadataFuture<'_, Option<FileRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return metadata_failure(backend_error("get"));
        }
        if self.corrupt_get.load(Ordering::SeqCst) {
            return metadata_failure(MetadataError::Decode {
                id: id.to_string(),
                reason: "invalid upload_date".to_string(),
            });
        }
        self.inner.get_file(id)
    }

    fn delete_file(&self, id: &str) -> MetadataFuture<'_, bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return metadata_failure(backend_error("delete"));
        }
        self.inner.delete_file(id)
    }

    fn count_files(&self) -> MetadataFuture<'_, u64> {
        self.inner.count_files()
    }

    fn record_health_check(&self) -> MetadataFuture<'_, HealthCheckRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_health.load(Ordering::SeqCst) {
            return metadata_failure(backend_error("health check"));
        }
        self.inner.record_health_check()
    }
}

// -- Helpers --------------------------------------------------------------------

struct Harness {
    app: Router,
    storage: Arc<FaultyStorage>,
    metadata: Arc<FaultyMetadata>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(Config::default())
    }

    fn with_config(config: Config) -> Self {
        let storage = Arc::new(FaultyStorage::default());
        let metadata = Arc::new(FaultyMetadata::default());
        let state = Arc::new(AppState {
            config,
            metadata: metadata.clone(),
            storage: storage.clone(),
        });
        Self {
            app: fileshelf::server::app(state),
            storage,
            metadata,
        }
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    async fn upload(&self, filename: &str, data: &[u8]) -> Value {
        let res = self.send(upload_request(filename, data)).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        json_body(res).await
    }

    async fn file_count(&self) -> u64 {
        self.metadata.inner.count_files().await.unwrap()
    }
}

fn request(method: Method, uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .unwrap()
}

fn multipart_body(field: &str, filename: Option<&str>, data: &[u8]) -> Vec<u8> {
    let disposition = match filename {
        Some(name) => format!("form-data; name=\"{field}\"; filename=\"{name}\""),
        None => format!("form-data; name=\"{field}\""),
    };
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: {disposition}\r\nContent-Type: text/plain\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/v1/file")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn upload_request(filename: &str, data: &[u8]) -> Request<Body> {
    multipart_request(multipart_body("file", Some(filename), data))
}

async fn body_bytes(res: Response) -> Bytes {
    res.into_body().collect().await.unwrap().to_bytes()
}

async fn json_body(res: Response) -> Value {
    serde_json::from_slice(&body_bytes(res).await).unwrap()
}

fn assert_no_cache(res: &Response) {
    assert_eq!(
        res.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache, no-store, must-revalidate"
    );
    assert_eq!(res.headers().get(header::PRAGMA).unwrap(), "no-cache");
}

// -- Health probe ---------------------------------------------------------------

#[tokio::test]
async fn healthz_ok_with_empty_body() {
    let h = Harness::new();
    let res = h.send(request(Method::GET, "/healthz", Body::empty())).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_no_cache(&res);
    assert!(body_bytes(res).await.is_empty());
    assert_eq!(h.metadata.calls(), 1);
}

#[tokio::test]
async fn healthz_with_query_is_bad_request() {
    let h = Harness::new();
    let res = h.send(request(Method::GET, "/healthz?x=1", Body::empty())).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_no_cache(&res);
    assert_eq!(h.metadata.calls(), 0);
}

#[tokio::test]
async fn healthz_with_body_is_bad_request() {
    let h = Harness::new();
    let res = h.send(request(Method::GET, "/healthz", "ping")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.metadata.calls(), 0);
}

#[tokio::test]
async fn healthz_db_failure_is_unavailable() {
    let h = Harness::new();
    h.metadata.fail_health.store(true, Ordering::SeqCst);
    let res = h.send(request(Method::GET, "/healthz", Body::empty())).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_no_cache(&res);
    assert!(body_bytes(res).await.is_empty());
}

// -- Gatekeeper -----------------------------------------------------------------

#[tokio::test]
async fn unimplemented_methods_are_not_allowed() {
    let h = Harness::new();
    let cases = [
        (Method::POST, "/healthz"),
        (Method::PUT, "/healthz"),
        (Method::DELETE, "/healthz"),
        (Method::PATCH, "/healthz"),
        (Method::HEAD, "/healthz"),
        (Method::OPTIONS, "/healthz"),
        (Method::GET, "/v1/file"),
        (Method::PUT, "/v1/file"),
        (Method::DELETE, "/v1/file"),
        (Method::PATCH, "/v1/file"),
        (Method::HEAD, "/v1/file"),
        (Method::OPTIONS, "/v1/file"),
        (Method::POST, "/v1/file/abc"),
        (Method::PUT, "/v1/file/abc"),
        (Method::PATCH, "/v1/file/abc"),
        (Method::HEAD, "/v1/file/abc"),
        (Method::OPTIONS, "/v1/file/abc"),
    ];
    for (method, path) in cases {
        let res = h.send(request(method.clone(), path, Body::empty())).await;
        assert_eq!(
            res.status(),
            StatusCode::METHOD_NOT_ALLOWED,
            "{method} {path}"
        );
        assert_no_cache(&res);
    }
    assert_eq!(h.metadata.calls(), 0);
    assert_eq!(h.storage.calls(), 0);
}

#[tokio::test]
async fn unknown_paths_are_not_allowed() {
    let h = Harness::new();
    for path in ["/", "/metrics", "/openapi.json", "/v1/files", "/v1/file/a/b", "/healthz/"] {
        for method in [Method::GET, Method::POST, Method::DELETE] {
            let res = h.send(request(method.clone(), path, Body::empty())).await;
            assert_eq!(
                res.status(),
                StatusCode::METHOD_NOT_ALLOWED,
                "{method} {path}"
            );
            assert_no_cache(&res);
        }
    }
}

#[tokio::test]
async fn oversized_body_on_bodyless_endpoint_is_bad_request() {
    let mut config = Config::default();
    config.server.max_upload_size = 64;
    let h = Harness::with_config(config);
    let cases = [
        (Method::GET, "/v1/file/any"),
        (Method::DELETE, "/v1/file/any"),
        (Method::GET, "/healthz"),
    ];
    for (method, path) in cases {
        let res = h.send(request(method.clone(), path, vec![b'x'; 1024])).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{method} {path}");
        assert_no_cache(&res);
        assert!(body_bytes(res).await.is_empty());
    }
    assert_eq!(h.metadata.calls(), 0);
    assert_eq!(h.storage.calls(), 0);
}

// -- Upload ---------------------------------------------------------------------

#[tokio::test]
async fn upload_then_get_returns_same_fields() {
    let h = Harness::new();
    let uploaded = h.upload("notes.txt", b"hello world").await;

    let file_id = uploaded["file_id"].as_str().unwrap();
    assert_eq!(uploaded["message"], "File added");
    assert_eq!(uploaded["size"], 11);
    assert_eq!(
        uploaded["file_name"].as_str().unwrap(),
        format!("{file_id}_notes.txt")
    );
    assert!(chrono::DateTime::parse_from_rfc3339(uploaded["upload_date"].as_str().unwrap()).is_ok());

    let res = h
        .send(request(Method::GET, &format!("/v1/file/{file_id}"), Body::empty()))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_no_cache(&res);
    let fetched = json_body(res).await;
    assert_eq!(fetched["id"], uploaded["file_id"]);
    assert_eq!(fetched["file_name"], uploaded["file_name"]);
    assert_eq!(fetched["file_url"], uploaded["file_url"]);
    assert_eq!(fetched["size"], uploaded["size"]);
    assert_eq!(fetched["upload_date"], uploaded["upload_date"]);
}

#[tokio::test]
async fn upload_response_carries_no_cache_headers() {
    let h = Harness::new();
    let res = h.send(upload_request("a.bin", b"\x00\x01")).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_no_cache(&res);
}

#[tokio::test]
async fn upload_without_file_part_is_bad_request() {
    let h = Harness::new();
    let res = h
        .send(multipart_request(multipart_body("other", Some("a.txt"), b"x")))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_no_cache(&res);
    let body = json_body(res).await;
    assert!(body["detail"].is_string());
    assert_eq!(h.storage.calls(), 0);
    assert_eq!(h.metadata.calls(), 0);
}

#[tokio::test]
async fn upload_part_without_filename_is_bad_request() {
    let h = Harness::new();
    let res = h
        .send(multipart_request(multipart_body("file", None, b"x")))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.storage.calls(), 0);
}

#[tokio::test]
async fn upload_without_multipart_is_bad_request() {
    let h = Harness::new();
    let res = h.send(request(Method::POST, "/v1/file", "plain body")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_no_cache(&res);
    assert_eq!(h.storage.calls(), 0);
}

#[tokio::test]
async fn upload_over_size_limit_is_rejected() {
    let mut config = Config::default();
    config.server.max_upload_size = 64;
    let h = Harness::with_config(config);
    let res = h.send(upload_request("big.bin", &[7u8; 1024])).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_no_cache(&res);
    let body = json_body(res).await;
    assert!(body["detail"].is_string());
    assert_eq!(h.storage.puts.load(Ordering::SeqCst), 0);
    assert_eq!(h.file_count().await, 0);
}

#[tokio::test]
async fn upload_store_failure_persists_nothing() {
    let h = Harness::new();
    h.storage.fail_put.store(true, Ordering::SeqCst);
    let res = h.send(upload_request("a.txt", b"abc")).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_no_cache(&res);
    assert_eq!(h.file_count().await, 0);
    assert_eq!(h.metadata.calls(), 0);
    assert_eq!(h.storage.deletes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upload_metadata_failure_compensates_once() {
    let h = Harness::new();
    h.metadata.fail_insert.store(true, Ordering::SeqCst);
    let res = h.send(upload_request("a.txt", b"abc")).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(h.storage.deletes.load(Ordering::SeqCst), 1);
    assert!(h.storage.inner.is_empty().await);
    assert_eq!(h.file_count().await, 0);
}

#[tokio::test]
async fn upload_failed_compensation_is_still_unavailable() {
    let h = Harness::new();
    h.metadata.fail_insert.store(true, Ordering::SeqCst);
    h.storage.fail_delete.store(true, Ordering::SeqCst);
    let res = h.send(upload_request("a.txt", b"abc")).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(h.storage.deletes.load(Ordering::SeqCst), 1);
    // The orphan blob is left behind, detectable.
    assert_eq!(h.storage.inner.len().await, 1);
}

#[tokio::test]
async fn upload_head_failure_compensates() {
    let h = Harness::new();
    h.storage.fail_head.store(true, Ordering::SeqCst);
    let res = h.send(upload_request("a.txt", b"abc")).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(h.storage.deletes.load(Ordering::SeqCst), 1);
    assert!(h.storage.inner.is_empty().await);
    assert_eq!(h.metadata.calls(), 0);
}

// -- Retrieval ------------------------------------------------------------------

#[tokio::test]
async fn get_unknown_is_not_found() {
    let h = Harness::new();
    let res = h.send(request(Method::GET, "/v1/file/missing", Body::empty())).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_no_cache(&res);
    assert!(body_bytes(res).await.is_empty());
}

#[tokio::test]
async fn get_with_body_is_rejected_before_backends() {
    let h = Harness::new();
    let res = h.send(request(Method::GET, "/v1/file/any", "{}")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.metadata.calls(), 0);
    assert_eq!(h.storage.calls(), 0);
}

#[tokio::test]
async fn get_backend_error_is_unavailable() {
    let h = Harness::new();
    let uploaded = h.upload("a.txt", b"abc").await;
    h.metadata.fail_get.store(true, Ordering::SeqCst);
    let uri = format!("/v1/file/{}", uploaded["file_id"].as_str().unwrap());
    let res = h.send(request(Method::GET, &uri, Body::empty())).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_no_cache(&res);
}

#[tokio::test]
async fn get_undecodable_record_is_not_found() {
    let h = Harness::new();
    let uploaded = h.upload("a.txt", b"abc").await;
    h.metadata.corrupt_get.store(true, Ordering::SeqCst);
    let uri = format!("/v1/file/{}", uploaded["file_id"].as_str().unwrap());
    let res = h.send(request(Method::GET, &uri, Body::empty())).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

// -- Deletion -------------------------------------------------------------------

#[tokio::test]
async fn delete_then_get_and_delete_again_are_not_found() {
    let h = Harness::new();
    let uploaded = h.upload("a.txt", b"abc").await;
    let uri = format!("/v1/file/{}", uploaded["file_id"].as_str().unwrap());

    let res = h.send(request(Method::DELETE, &uri, Body::empty())).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_no_cache(&res);
    assert!(body_bytes(res).await.is_empty());
    assert!(h.storage.inner.is_empty().await);

    let res = h.send(request(Method::GET, &uri, Body::empty())).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = h.send(request(Method::DELETE, &uri, Body::empty())).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_unknown_is_not_found_without_store_call() {
    let h = Harness::new();
    let res = h.send(request(Method::DELETE, "/v1/file/missing", Body::empty())).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(h.storage.deletes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn delete_with_body_is_rejected_before_backends() {
    let h = Harness::new();
    let uploaded = h.upload("a.txt", b"abc").await;
    let metadata_calls = h.metadata.calls();
    let storage_calls = h.storage.calls();

    let uri = format!("/v1/file/{}", uploaded["file_id"].as_str().unwrap());
    let res = h.send(request(Method::DELETE, &uri, "x")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_no_cache(&res);
    assert_eq!(h.metadata.calls(), metadata_calls);
    assert_eq!(h.storage.calls(), storage_calls);
    assert_eq!(h.file_count().await, 1);
}

#[tokio::test]
async fn delete_store_failure_keeps_metadata() {
    let h = Harness::new();
    let uploaded = h.upload("a.txt", b"abc").await;
    h.storage.fail_delete.store(true, Ordering::SeqCst);
    let uri = format!("/v1/file/{}", uploaded["file_id"].as_str().unwrap());

    let res = h.send(request(Method::DELETE, &uri, Body::empty())).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(h.file_count().await, 1);

    let res = h.send(request(Method::GET, &uri, Body::empty())).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn delete_metadata_failure_is_unavailable() {
    let h = Harness::new();
    let uploaded = h.upload("a.txt", b"abc").await;
    h.metadata.fail_delete.store(true, Ordering::SeqCst);
    let uri = format!("/v1/file/{}", uploaded["file_id"].as_str().unwrap());

    let res = h.send(request(Method::DELETE, &uri, Body::empty())).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_no_cache(&res);
    // Blob is gone, record remains.
    assert!(h.storage.inner.is_empty().await);
    assert_eq!(h.file_count().await, 1);
}
