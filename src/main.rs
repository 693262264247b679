//! fileshelf -- file upload and metadata service.
//!
//! Crash-only design: every startup is a recovery. There is no separate
//! recovery mode. SIGTERM/SIGINT handlers only stop accepting connections
//! and wait for in-flight requests before exiting -- no cleanup.

use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

use fileshelf::config::{Config, LoggingConfig};
use fileshelf::metadata::store::MetadataStore;
use fileshelf::storage::backend::StorageBackend;

/// Command-line arguments for the fileshelf server.
#[derive(Parser, Debug)]
#[command(name = "fileshelf", version, about = "File upload and metadata service")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "fileshelf.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = fileshelf::config::load_config(&cli.config)?;
    init_logging(&config.logging)?;
    info!("Loaded configuration from {}", cli.config);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize Prometheus metrics recorder and register metric descriptions.
    if config.observability.metrics {
        fileshelf::metrics::init_metrics()?;
        fileshelf::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    } else {
        warn!("Metrics disabled; /metrics will answer 503");
    }

    let metadata = open_metadata_store(&config)?;
    let storage = open_storage_backend(&config).await?;

    let state = Arc::new(fileshelf::AppState {
        config: config.clone(),
        metadata,
        storage,
    });

    // Admin listener: /metrics and /openapi.json, never on the public port.
    let admin_addr = format!("{}:{}", config.server.host, config.observability.admin_port);
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr).await?;
    info!("Admin endpoints listening on {}", admin_addr);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(admin_listener, fileshelf::server::admin_app())
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!("Admin listener failed: {}", e);
        }
    });

    let app = fileshelf::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("fileshelf listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("fileshelf shut down");

    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `logging.level`.  When `logging.file`
/// is set, every line goes to stdout and is appended to the file.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let writer = match &config.file {
        Some(path) => {
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(std::io::stdout.and(Mutex::new(file)))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.file.is_none())
        .with_writer(writer);

    match config.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

/// Open the metadata store selected by `metadata.engine`.
fn open_metadata_store(config: &Config) -> anyhow::Result<Arc<dyn MetadataStore>> {
    match config.metadata.engine.as_str() {
        "memory" => {
            info!("In-memory metadata store initialized (records are not persisted)");
            Ok(Arc::new(
                fileshelf::metadata::memory::MemoryMetadataStore::new(),
            ))
        }
        _ => {
            let path = &config.metadata.sqlite.path;
            // Ensure parent directory exists for the SQLite file.
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = fileshelf::metadata::sqlite::SqliteMetadataStore::new(path)?;
            info!("SQLite metadata store initialized at {}", path);
            Ok(Arc::new(store))
        }
    }
}

/// Open the object store selected by `storage.backend`.
async fn open_storage_backend(config: &Config) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match config.storage.backend.as_str() {
        "aws" => {
            let aws_config = config.storage.aws.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.backend is 'aws' but storage.aws config section is missing")
            })?;
            let backend = fileshelf::storage::aws::AwsBackend::new(aws_config).await?;
            info!(
                "AWS storage backend initialized: bucket={} region={} prefix='{}'",
                aws_config.bucket, aws_config.region, aws_config.prefix
            );
            Ok(Arc::new(backend))
        }
        "memory" => {
            info!("In-memory storage backend initialized (blobs are not persisted)");
            Ok(Arc::new(fileshelf::storage::memory::MemoryBackend::default()))
        }
        _ => {
            let root = &config.storage.local.root_dir;
            let backend = fileshelf::storage::local::LocalBackend::new(root)?;
            info!("Local storage backend initialized at {}", root);
            Ok(Arc::new(backend))
        }
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
///
/// If a handler cannot be installed, the corresponding branch never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
