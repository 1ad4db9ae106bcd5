//! Aloha Core Library
//!
//! Persistent-state lifecycle for the Aloha recruitment admin:
//! - Storage configuration derived from the volume root
//! - Database access with a closable, reopenable handle
//! - Asset store over the uploads directory
//! - Snapshot archives (export) and staged restore (import)
//! - Retention sweeper for rejected applicants
//! - Daily auto-backup slot

pub mod assets;
pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod retention;

pub use assets::{AssetDeletion, AssetStore};
pub use backup::{
    snapshot_filename, AutoSnapshot, RestartPolicy, RestoreCoordinator, RestoreReport,
    RestoreState, SnapshotArchiver, SnapshotSummary, DB_ENTRY, UPLOADS_PREFIX,
};
pub use config::{RetentionPolicy, ScheduleConfig, StorageConfig};
pub use db::{Database, DatabaseHandle};
pub use error::{Error, Result};
pub use models::{Applicant, ApplicantStatus, AuditEntry, AuditPage, NewApplicant, Pagination};
pub use retention::{RetentionSweeper, SweepReport};
