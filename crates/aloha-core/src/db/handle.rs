//! Lifecycle manager for the live database
//!
//! The pool is the one long-lived resource a restore has to break. Request
//! handlers and background tasks borrow a [`Database`] through [`DatabaseHandle::get`];
//! the restore coordinator is the only caller of [`DatabaseHandle::close`] and
//! [`DatabaseHandle::reopen`]. While closed, `get` returns
//! [`Error::DatabaseClosed`](crate::error::Error::DatabaseClosed).

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::Database;
use crate::error::{Error, Result};

/// How long `close` waits for borrowed connections to come back
const QUIESCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for borrowed connections
const QUIESCE_POLL: Duration = Duration::from_millis(10);

/// Shared, closable handle to the live database
#[derive(Clone)]
pub struct DatabaseHandle {
    inner: Arc<RwLock<Option<Database>>>,
    path: PathBuf,
}

impl DatabaseHandle {
    /// Open the database at `path` and wrap it
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(path.as_ref())?;
        Ok(Self::from_database(db))
    }

    /// Wrap an already opened database
    pub fn from_database(db: Database) -> Self {
        let path = db.path().to_path_buf();
        Self {
            inner: Arc::new(RwLock::new(Some(db))),
            path,
        }
    }

    /// Path of the database file this handle manages
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Borrow the live database
    pub fn get(&self) -> Result<Database> {
        self.read().clone().ok_or(Error::DatabaseClosed)
    }

    pub fn is_open(&self) -> bool {
        self.read().is_some()
    }

    /// Quiesce: retire the pool, wait for borrowed connections, checkpoint, drop
    ///
    /// Every [`Database`] handed out by `get` shares the retirement, so callers
    /// that borrowed before the close get `DatabaseClosed` on their next query.
    /// A query already running is waited for up to `QUIESCE_TIMEOUT`; past
    /// that the close proceeds with a warning.
    pub fn close(&self) {
        let previous = self.write().take();
        match previous {
            Some(db) => {
                db.retire();
                wait_for_borrowers(&db, QUIESCE_TIMEOUT);
                if let Err(e) = db.checkpoint() {
                    warn!("WAL checkpoint before close failed (continuing): {}", e);
                }
                drop(db);
                info!("Database closed: {}", self.path.display());
            }
            None => warn!("Database already closed: {}", self.path.display()),
        }
    }

    /// Open a fresh pool on whatever file now lives at the handle's path
    pub fn reopen(&self) -> Result<()> {
        let mut guard = self.write();
        let db = Database::open(&self.path)?;
        *guard = Some(db);
        info!("Database reopened: {}", self.path.display());
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Database>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Database>> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Block until no connection is checked out of `db`'s pool, or `timeout` passes
fn wait_for_borrowers(db: &Database, timeout: Duration) -> bool {
    let started = Instant::now();
    loop {
        let in_use = db.connections_in_use();
        if in_use == 0 {
            return true;
        }
        if started.elapsed() >= timeout {
            warn!(
                "{} connection(s) still in use after {:?}; closing {} anyway",
                in_use,
                timeout,
                db.path().display()
            );
            return false;
        }
        debug!("Waiting for {} borrowed connection(s) before close", in_use);
        std::thread::sleep(QUIESCE_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_close_then_get_fails() {
        let dir = TempDir::new().unwrap();
        let handle = DatabaseHandle::open(dir.path().join("h.db")).unwrap();
        assert!(handle.is_open());

        handle.close();
        assert!(!handle.is_open());
        assert!(matches!(handle.get(), Err(Error::DatabaseClosed)));

        // closing twice is harmless
        handle.close();
    }

    #[test]
    fn test_reopen_sees_persisted_rows() {
        let dir = TempDir::new().unwrap();
        let handle = DatabaseHandle::open(dir.path().join("h.db")).unwrap();
        handle
            .get()
            .unwrap()
            .log_audit("tester", "BEFORE_CLOSE", None)
            .unwrap();

        handle.close();
        handle.reopen().unwrap();

        let page = handle.get().unwrap().list_audit_log(1, 10).unwrap();
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].action, "BEFORE_CLOSE");
    }

    #[test]
    fn test_close_retires_earlier_borrowers() {
        let dir = TempDir::new().unwrap();
        let handle = DatabaseHandle::open(dir.path().join("h.db")).unwrap();
        let borrowed = handle.get().unwrap();

        handle.close();

        assert!(matches!(
            borrowed.log_audit("tester", "AFTER_CLOSE", None),
            Err(Error::DatabaseClosed)
        ));

        // The fresh pool after reopen is unaffected
        handle.reopen().unwrap();
        assert!(handle.get().unwrap().log_audit("tester", "REOPENED", None).is_ok());
        assert!(borrowed.conn().is_err());
    }

    #[test]
    fn test_close_waits_for_connection_in_use() {
        let dir = TempDir::new().unwrap();
        let handle = DatabaseHandle::open(dir.path().join("h.db")).unwrap();
        let conn = handle.get().unwrap().conn().unwrap();

        let (tx, rx) = mpsc::channel();
        let closer = {
            let handle = handle.clone();
            thread::spawn(move || {
                handle.close();
                tx.send(()).unwrap();
            })
        };

        // close must still be waiting while the connection is checked out
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        drop(conn);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        closer.join().unwrap();
        assert!(!handle.is_open());
    }

    #[test]
    fn test_wait_for_borrowers_times_out() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("h.db")).unwrap();
        let _conn = db.conn().unwrap();

        assert!(!wait_for_borrowers(&db, Duration::from_millis(30)));
    }

    #[test]
    fn test_clones_share_state() {
        let dir = TempDir::new().unwrap();
        let handle = DatabaseHandle::open(dir.path().join("h.db")).unwrap();
        let other = handle.clone();

        handle.close();
        assert!(!other.is_open());
    }
}
