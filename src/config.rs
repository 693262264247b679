//! Configuration loading and types for fileshelf.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! service: networking, metadata persistence, object storage, logging,
//! and observability.  Every field has a default, so an empty file is a
//! valid configuration.

use garde::Validate;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default, Validate)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    #[garde(dive)]
    pub server: ServerConfig,

    /// Metadata store settings.
    #[serde(default)]
    #[garde(dive)]
    pub metadata: MetadataConfig,

    /// Object storage backend settings.
    #[serde(default)]
    #[garde(dive)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    #[garde(dive)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + admin listener).
    #[serde(default)]
    #[garde(dive)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    #[garde(length(min = 1))]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    #[garde(range(min = 1))]
    pub port: u16,

    /// Maximum accepted request body in bytes (default 100 MiB).
    #[serde(default = "default_max_upload_size")]
    #[garde(range(min = 1))]
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    #[garde(length(min = 1))]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    #[garde(pattern(r"^(text|json)$"))]
    pub format: String,

    /// Optional log file.  Lines are written to stdout and to this file.
    #[serde(default)]
    #[garde(skip)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

/// Observability settings.
///
/// Metrics are rendered on a separate admin listener so the public
/// listener keeps its strict path allowlist.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the admin listener.
    #[serde(default = "default_true")]
    #[garde(skip)]
    pub metrics: bool,

    /// Port of the admin listener serving `/metrics` and `/openapi.json`.
    #[serde(default = "default_admin_port")]
    #[garde(range(min = 1))]
    pub admin_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            admin_port: default_admin_port(),
        }
    }
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MetadataConfig {
    /// Backend type: `sqlite` or `memory`.
    #[serde(default = "default_metadata_engine")]
    #[garde(pattern(r"^(sqlite|memory)$"))]
    pub engine: String,

    /// SQLite-specific configuration.
    #[serde(default)]
    #[garde(dive)]
    pub sqlite: SqliteConfig,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            engine: default_metadata_engine(),
            sqlite: SqliteConfig::default(),
        }
    }
}

/// SQLite-specific metadata configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_metadata_path")]
    #[garde(length(min = 1))]
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
        }
    }
}

/// Object storage backend configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StorageConfig {
    /// Backend type: `local`, `memory`, `aws`.
    #[serde(default = "default_storage_backend")]
    #[garde(pattern(r"^(local|memory|aws)$"))]
    pub backend: String,

    /// Local storage configuration.
    #[serde(default)]
    #[garde(dive)]
    pub local: LocalStorageConfig,

    /// AWS S3 configuration.
    #[serde(default)]
    #[garde(dive)]
    pub aws: Option<AwsStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            local: LocalStorageConfig::default(),
            aws: None,
        }
    }
}

/// Local filesystem storage configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LocalStorageConfig {
    /// Root directory for stored objects.
    #[serde(default = "default_storage_root")]
    #[garde(length(min = 1))]
    pub root_dir: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
        }
    }
}

/// AWS S3 configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AwsStorageConfig {
    /// S3 bucket receiving the uploads.
    #[garde(length(min = 1))]
    pub bucket: String,
    /// AWS region.
    #[serde(default = "default_region")]
    #[garde(length(min = 1))]
    pub region: String,
    /// Key prefix in the bucket.
    #[serde(default)]
    #[garde(skip)]
    pub prefix: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    #[garde(skip)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    #[garde(skip)]
    pub use_path_style: bool,
    /// Explicit AWS access key (falls back to env/credential chain).
    #[serde(default)]
    #[garde(skip)]
    pub access_key_id: String,
    /// Explicit AWS secret key (falls back to env/credential chain).
    #[serde(default)]
    #[garde(skip)]
    pub secret_access_key: String,
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_admin_port() -> u16 {
    9090
}

fn default_max_upload_size() -> usize {
    104_857_600 // 100 MiB
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_metadata_engine() -> String {
    "sqlite".to_string()
}

fn default_metadata_path() -> String {
    "./data/metadata.db".to_string()
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_storage_root() -> String {
    "./data/objects".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Parse and validate configuration from YAML text.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    // An empty document deserializes to `null`, not to an empty mapping.
    let config: Config = if contents.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml::from_str(contents)?
    };
    config
        .validate()
        .map_err(|report| anyhow::anyhow!("invalid configuration: {report}"))?;
    if config.storage.backend == "aws" && config.storage.aws.is_none() {
        anyhow::bail!("storage.backend is 'aws' but storage.aws config section is missing");
    }
    Ok(config)
}

/// Load, parse and validate configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}
