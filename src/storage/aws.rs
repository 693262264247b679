//! AWS S3 storage backend.
//!
//! Stores every blob in a single S3 bucket under an optional key prefix:
//!   `{prefix}{key}`
//!
//! Credentials are resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.) unless explicit keys
//! are configured.

use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info};

use super::backend::{BlobMetadata, StorageBackend};
use crate::config::AwsStorageConfig;

/// Backend that forwards operations to AWS S3 (or an S3-compatible
/// endpoint such as MinIO).
pub struct AwsBackend {
    /// AWS S3 SDK client.
    client: Client,
    /// The S3 bucket name.
    bucket: String,
    /// Region, used to build virtual-hosted URLs.
    region: String,
    /// Key prefix for all blobs in the bucket.
    prefix: String,
    /// Custom endpoint; URLs become path-style when set.
    endpoint_url: Option<String>,
}

impl AwsBackend {
    /// Create a new AWS backend from its configuration section.
    ///
    /// Loads AWS credentials from the default credential chain unless an
    /// explicit key pair is configured, and initializes the S3 client for
    /// the specified region.
    pub async fn new(config: &AwsStorageConfig) -> anyhow::Result<Self> {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        let endpoint_url = non_empty(&config.endpoint_url);
        if let Some(ref endpoint) = endpoint_url {
            config_loader = config_loader.endpoint_url(endpoint);
        }

        if let (Some(ak), Some(sk)) = (
            non_empty(&config.access_key_id),
            non_empty(&config.secret_access_key),
        ) {
            let creds = aws_sdk_s3::config::Credentials::new(
                ak,
                sk,
                None, // session_token
                None, // expiry
                "fileshelf-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.use_path_style);

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            "AWS backend initialized: bucket={} region={} prefix='{}'",
            config.bucket, config.region, config.prefix
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            prefix: config.prefix.clone(),
            endpoint_url,
        })
    }

    /// Map a key to the upstream S3 key.
    fn s3_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Map an AWS SDK error to an anyhow error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
        anyhow::anyhow!("AWS S3 {context}: {err}")
    }
}

/// `None` for an empty config string.
fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Build the public URL of an S3 key.
fn object_url(bucket: &str, region: &str, endpoint_url: Option<&str>, s3_key: &str) -> String {
    match endpoint_url {
        Some(endpoint) => format!("{}/{bucket}/{s3_key}", endpoint.trim_end_matches('/')),
        None => format!("https://{bucket}.s3.{region}.amazonaws.com/{s3_key}"),
    }
}

/// Convert an S3 timestamp into a chrono UTC timestamp.
fn to_utc(dt: &aws_sdk_s3::primitives::DateTime) -> anyhow::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
        .ok_or_else(|| anyhow::anyhow!("AWS S3 head_object: last-modified out of range"))
}

impl StorageBackend for AwsBackend {
    fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let key = key.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            let s3_key = self.s3_key(&key);

            debug!("AWS put_object: bucket={} key={}", self.bucket, s3_key);

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .content_type(content_type)
                .body(aws_sdk_s3::primitives::ByteStream::from(data))
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("put_object", e.into_service_error()))?;

            Ok(())
        })
    }

    fn head(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<BlobMetadata>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let s3_key = self.s3_key(&key);

            debug!("AWS head_object: bucket={} key={}", self.bucket, s3_key);

            let resp = self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
                .map_err(|e| {
                    let service_err = e.into_service_error();
                    if service_err.is_not_found() {
                        anyhow::anyhow!("Object not found at key: {key}")
                    } else {
                        Self::map_sdk_error("head_object", service_err)
                    }
                })?;

            let size = resp.content_length().unwrap_or(0).max(0) as u64;
            let content_type = resp
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let last_modified = resp
                .last_modified()
                .ok_or_else(|| anyhow::anyhow!("AWS S3 head_object: missing last-modified"))
                .and_then(to_utc)?;

            Ok(BlobMetadata {
                size,
                content_type,
                last_modified,
            })
        })
    }

    fn delete(&self, key: &str) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let s3_key = self.s3_key(&key);

            debug!("AWS delete_object: bucket={} key={}", self.bucket, s3_key);

            // S3 delete_object is idempotent -- no error for missing keys.
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&s3_key)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("delete_object", e.into_service_error()))?;

            Ok(())
        })
    }

    fn url(&self, key: &str) -> String {
        object_url(
            &self.bucket,
            &self.region,
            self.endpoint_url.as_deref(),
            &self.s3_key(key),
        )
    }
}

// -- Tests -------------------------------------------------------------------
