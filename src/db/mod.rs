//! SQLite-backed [`PersistenceMedium`].
//!
//! Both corpus streams live as rows of the `blobs` table, and
//! [`SqliteMedium::write_batch`] replaces them inside one transaction, so a
//! reader never observes one stream from a newer snapshot than the other.

pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::store::medium::PersistenceMedium;

/// File name of the database inside the data directory.
pub const DB_FILE_NAME: &str = "corpus.db";

/// Open (or create) the database at the given path with schema and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with schema and migrations applied.
pub fn open_memory_database() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Result of [`check_database_health`].
#[derive(Debug)]
pub struct HealthReport {
    pub schema_version: u32,
    pub embedding_model: Option<String>,
    pub streams: Vec<StreamInfo>,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

/// Size and last write time of one persisted stream.
#[derive(Debug)]
pub struct StreamInfo {
    pub key: String,
    pub bytes: u64,
    pub updated_at: Option<String>,
}

/// Run `PRAGMA integrity_check` and collect per-stream details.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn)?;
    let embedding_model = migrations::get_embedding_model(conn)?;

    let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;

    let mut stmt =
        conn.prepare("SELECT key, length(bytes), updated_at FROM blobs ORDER BY key")?;
    let streams = stmt
        .query_map([], |row| {
            Ok(StreamInfo {
                key: row.get(0)?,
                bytes: row.get::<_, i64>(1)? as u64,
                updated_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HealthReport {
        schema_version,
        embedding_model,
        streams,
        integrity_ok: integrity == "ok",
        integrity_details: integrity,
    })
}

/// [`PersistenceMedium`] over a single SQLite connection.
pub struct SqliteMedium {
    conn: Mutex<Connection>,
}

impl SqliteMedium {
    /// Open `<dir>/corpus.db`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let conn = open_database(dir.as_ref().join(DB_FILE_NAME))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Compare the recorded embedding model with `model`, recording it on first use.
    ///
    /// Returns the previously recorded model when it differs.
    pub fn check_embedding_model(&self, model: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        match migrations::get_embedding_model(&conn)? {
            Some(stored) if stored != model => Ok(Some(stored)),
            Some(_) => Ok(None),
            None => {
                migrations::set_embedding_model(&conn, model)?;
                Ok(None)
            }
        }
    }

    /// Run a health check on the underlying connection.
    pub fn health(&self) -> Result<HealthReport> {
        let conn = self.lock()?;
        check_database_health(&conn)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))
    }
}

fn upsert_blob(conn: &Connection, key: &str, bytes: &[u8]) -> rusqlite::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO blobs (key, bytes, updated_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT(key) DO UPDATE SET bytes = excluded.bytes, updated_at = excluded.updated_at",
        params![key, bytes, now],
    )?;
    Ok(())
}

impl PersistenceMedium for SqliteMedium {
    fn read_all(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        let bytes = conn
            .query_row("SELECT bytes FROM blobs WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()
            .with_context(|| format!("failed to read stream {key}"))?;
        Ok(bytes)
    }

    fn write_all(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let conn = self.lock()?;
        upsert_blob(&conn, key, bytes).with_context(|| format!("failed to write stream {key}"))
    }

    fn write_batch(&self, entries: &[(&str, &[u8])]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for (key, bytes) in entries {
            upsert_blob(&tx, key, bytes).with_context(|| format!("failed to write stream {key}"))?;
        }
        tx.commit().context("failed to commit snapshot")?;
        Ok(())
    }

    fn describe(&self) -> String {
        "sqlite".into()
    }
}
