//! Daily auto-backup slot
//!
//! A raw copy of the database file at a fixed path, overwritten on every run.
//! No archive and no history: it is the last-resort recovery point.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::db::DatabaseHandle;
use crate::error::Result;

/// Copies the live database file into the auto-backup slot
pub struct AutoSnapshot {
    db_path: PathBuf,
    slot: PathBuf,
    handle: Option<DatabaseHandle>,
}

impl AutoSnapshot {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            db_path: config.db_path.clone(),
            slot: config.auto_backup_path.clone(),
            handle: None,
        }
    }

    /// Checkpoint through `handle` before each copy so the file holds every commit
    pub fn with_handle(mut self, handle: DatabaseHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn slot(&self) -> &Path {
        &self.slot
    }

    /// Copy the database into the slot
    ///
    /// Returns the bytes copied, or `None` when there is no database file yet.
    pub fn run_once(&self) -> Result<Option<u64>> {
        if !self.db_path.is_file() {
            debug!("No database at {}, auto-backup skipped", self.db_path.display());
            return Ok(None);
        }

        if let Some(handle) = &self.handle {
            match handle.get() {
                Ok(db) => {
                    if let Err(e) = db.checkpoint() {
                        warn!("Checkpoint before auto-backup failed (copying anyway): {}", e);
                    }
                }
                Err(e) => debug!("Auto-backup without checkpoint: {}", e),
            }
        }

        if let Some(parent) = self.slot.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Copy beside the slot, then rename over it
        let partial = partial_path(&self.slot);
        let bytes = match fs::copy(&self.db_path, &partial) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e.into());
            }
        };
        if let Err(e) = fs::rename(&partial, &self.slot) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        info!("Auto-backup written to {} ({} bytes)", self.slot.display(), bytes);
        Ok(Some(bytes))
    }
}

fn partial_path(slot: &Path) -> PathBuf {
    let name = slot
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "auto_backup".to_string());
    slot.with_file_name(format!(".{}.partial", name))
}
