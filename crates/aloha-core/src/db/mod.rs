//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `handle` - Lifecycle manager that owns the live pool and can close/reopen it
//! - `applicants` - Applicant records (the rows that reference uploads)
//! - `audit` - Audit log sink and paged listing

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use tracing::{debug, info};

use crate::error::{Error, Result};

mod applicants;
mod audit;
mod handle;

pub use handle::DatabaseHandle;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// SQLite datetime format used for every stored timestamp (UTC)
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp the way SQLite's CURRENT_TIMESTAMP does
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

/// Parse the SQLite datetime string read from column `idx`
pub(crate) fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map(|dt| dt.and_utc())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: PathBuf,
    /// Shared by every clone; once set, `conn` refuses new connections
    retired: Arc<AtomicBool>,
}

impl Database {
    /// Open (creating if needed) the database file and run migrations
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_path_buf(),
            retired: Arc::new(AtomicBool::new(false)),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because every pooled
    /// connection to `:memory:` would see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "aloha_test_{}_{}.db",
            std::process::id(),
            id
        ));

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::open(&path)
    }

    /// Get a connection from the pool
    ///
    /// Fails with `DatabaseClosed` once the pool has been retired, including
    /// through clones taken before the handle was closed.
    pub fn conn(&self) -> Result<DbConn> {
        if self.is_retired() {
            return Err(Error::DatabaseClosed);
        }
        Ok(self.pool.get()?)
    }

    /// Stop handing out connections on this pool and every clone of it
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Connections currently checked out of the pool
    pub(crate) fn connections_in_use(&self) -> u32 {
        let state = self.pool.state();
        state.connections.saturating_sub(state.idle_connections)
    }

    /// Write a consistent point-in-time copy of the database to `dest`
    ///
    /// Uses `VACUUM INTO`, which reads through a single transaction and so
    /// includes committed WAL content. `dest` must not exist yet.
    pub fn snapshot_to(&self, dest: &Path) -> Result<()> {
        let conn = self.conn()?;
        let dest_str = dest.to_string_lossy().to_string();
        conn.execute("VACUUM INTO ?1", [dest_str])?;
        debug!("Snapshot of {} written to {}", self.db_path.display(), dest.display());
        Ok(())
    }

    /// Fold the WAL back into the main database file
    ///
    /// Also runs on a retired pool; closing the handle checkpoints last.
    pub fn checkpoint(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_row| Ok(()))?;
        Ok(())
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- WAL mode: readers don't block writers
            -- Note: creates -wal and -shm sidecar files alongside the database
            PRAGMA journal_mode = WAL;

            -- Synchronous NORMAL: good balance of safety and performance
            PRAGMA synchronous = NORMAL;

            -- Applicants (records that own uploaded assets)
            CREATE TABLE IF NOT EXISTS applicants (
                id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                email TEXT,
                position TEXT,
                status TEXT NOT NULL DEFAULT 'Pending',   -- Pending, For Interview, Hired, Rejected
                resume_path TEXT,                         -- stored upload reference
                id_image_path TEXT,                       -- stored upload reference
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_applicants_status_updated ON applicants(status, updated_at);

            -- Audit log (admin actions, including backup and restore)
            CREATE TABLE IF NOT EXISTS audit_logs (
                id INTEGER PRIMARY KEY,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                details TEXT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
            "#,
        )?;

        info!("Database schema initialized: {}", self.db_path.display());
        Ok(())
    }
}
