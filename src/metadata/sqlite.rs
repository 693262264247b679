//! SQLite-backed metadata store.
//!
//! Uses `rusqlite` with the `bundled` feature so no system SQLite
//! library is required.  All async trait methods are thin wrappers
//! around synchronous rusqlite calls executed under a `Mutex`.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::store::{FileRecord, HealthCheckRecord, MetadataFuture, MetadataStore};
use crate::errors::MetadataError;

/// Current schema version. Bumped when migrations are added.
const SCHEMA_VERSION: i64 = 1;

/// Metadata store backed by a single SQLite database file.
pub struct SqliteMetadataStore {
    /// The database connection, guarded by a mutex for Send + Sync.
    conn: Mutex<Connection>,
}

/// Raw `files` row before it is shaped into a [`FileRecord`].
type FileRow = (String, String, String, i64, String);

impl SqliteMetadataStore {
    /// Open (or create) the database at `path` and initialize the schema.
    ///
    /// Passing `":memory:"` creates an in-memory database (useful for tests).
    pub fn new(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.apply_pragmas()?;
        store.init_db()?;
        Ok(store)
    }

    /// Lock the connection, surfacing a poisoned mutex as a backend error.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, MetadataError> {
        self.conn
            .lock()
            .map_err(|_| MetadataError::Backend(anyhow::anyhow!("connection mutex poisoned")))
    }

    /// Apply recommended SQLite pragmas for performance and safety.
    fn apply_pragmas(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(())
    }

    /// Create the required tables if they do not already exist.
    /// This is idempotent -- safe to call on every startup (crash-only design).
    fn init_db(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version    INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );

            -- Uploaded files
            CREATE TABLE IF NOT EXISTS files (
                id           TEXT PRIMARY KEY,
                file_name    TEXT NOT NULL,
                url          TEXT NOT NULL,
                size         INTEGER NOT NULL,
                upload_date  TEXT NOT NULL
            );

            -- Liveness probes (append-only)
            CREATE TABLE IF NOT EXISTS health_checks (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                datetime  TEXT NOT NULL
            );
            ",
        )?;

        let existing: Option<i64> = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .optional()?
            .flatten();

        if existing.map_or(true, |v| v < SCHEMA_VERSION) {
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![SCHEMA_VERSION, format_timestamp(&Utc::now())],
            )?;
        }

        Ok(())
    }
}

/// Format a timestamp as RFC 3339 with microsecond precision.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Shape a raw `files` row into a [`FileRecord`].
fn decode_file_row(row: FileRow) -> Result<FileRecord, MetadataError> {
    let (id, stored_name, url, size, upload_date) = row;
    let size = u64::try_from(size).map_err(|_| MetadataError::Decode {
        id: id.clone(),
        reason: format!("negative size {size}"),
    })?;
    let upload_date = DateTime::parse_from_rfc3339(&upload_date)
        .map_err(|e| MetadataError::Decode {
            id: id.clone(),
            reason: format!("invalid upload_date '{upload_date}': {e}"),
        })?
        .with_timezone(&Utc);
    Ok(FileRecord {
        id,
        stored_name,
        url,
        size,
        upload_date,
    })
}

// ── MetadataStore implementation ───────────────────────────────────

impl MetadataStore for SqliteMetadataStore {
    fn insert_file(&self, record: FileRecord) -> MetadataFuture<'_, ()> {
        Box::pin(async move {
            let size = i64::try_from(record.size).map_err(|_| {
                MetadataError::Backend(anyhow::anyhow!("size {} exceeds INTEGER", record.size))
            })?;
            let conn = self.lock()?;
            // Dropping an uncommitted transaction rolls it back.
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO files (id, file_name, url, size, upload_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.stored_name,
                    record.url,
                    size,
                    format_timestamp(&record.upload_date),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn get_file(&self, id: &str) -> MetadataFuture<'_, Option<FileRecord>> {
        let id = id.to_string();
        Box::pin(async move {
            let row: Option<FileRow> = {
                let conn = self.lock()?;
                conn.query_row(
                    "SELECT id, file_name, url, size, upload_date FROM files WHERE id = ?1",
                    params![id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
                )
                .optional()?
            };
            row.map(decode_file_row).transpose()
        })
    }

    fn delete_file(&self, id: &str) -> MetadataFuture<'_, bool> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            let tx = conn.unchecked_transaction()?;
            let removed = tx.execute("DELETE FROM files WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    fn count_files(&self) -> MetadataFuture<'_, u64> {
        Box::pin(async move {
            let conn = self.lock()?;
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn record_health_check(&self) -> MetadataFuture<'_, HealthCheckRecord> {
        Box::pin(async move {
            let now = Utc::now();
            let conn = self.lock()?;
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO health_checks (datetime) VALUES (?1)",
                params![format_timestamp(&now)],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(HealthCheckRecord { id, datetime: now })
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────
