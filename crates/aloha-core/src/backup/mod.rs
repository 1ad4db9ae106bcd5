//! Snapshot export, restore, and the auto-backup slot
//!
//! # Archive format
//!
//! A zip container with:
//! - exactly one root-level entry [`DB_ENTRY`] holding the full database file
//! - zero or more entries under [`UPLOADS_PREFIX`] holding the asset tree,
//!   paths relative to the asset root
//!
//! An archive without [`DB_ENTRY`] is not a snapshot of this system.
//!
//! File naming: `aloha_backup_YYYY-MM-DD.zip`
//!
//! # Components
//!
//! - `SnapshotArchiver` writes an archive of the live state
//! - `RestoreCoordinator` validates, stages, and swaps an archive into place
//! - `AutoSnapshot` copies the raw database file to a fixed slot

use chrono::NaiveDate;

mod archive;
mod auto;
mod restore;

pub use archive::{SnapshotArchiver, SnapshotSummary};
pub use auto::AutoSnapshot;
pub use restore::{RestartPolicy, RestoreCoordinator, RestoreReport, RestoreState};

/// Name of the database entry at the archive root
pub const DB_ENTRY: &str = crate::config::DB_FILE_NAME;

/// Prefix under which the asset tree is stored
pub const UPLOADS_PREFIX: &str = "uploads/";

/// Download filename for a snapshot taken on `date`
pub fn snapshot_filename(date: NaiveDate) -> String {
    format!("aloha_backup_{}.zip", date.format("%Y-%m-%d"))
}
