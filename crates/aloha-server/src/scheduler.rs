//! Background maintenance tasks
//!
//! Two independent tokio tasks run for the life of the server:
//!
//! - Retention sweep at the top of every hour: purges rejected applicants
//!   past the grace period (`ALOHA_RETENTION_HOURS`) and their uploads
//! - Auto-backup once a day at `ALOHA_AUTO_BACKUP_AT` (`ALOHA_UTC_OFFSET`):
//!   raw copy of the database into the auto-backup slot
//!
//! Failures are logged and never surfaced; the next tick runs regardless.
//! The work itself runs on blocking threads.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use aloha_core::config::next_hourly_run;
use aloha_core::{AssetStore, AutoSnapshot, DatabaseHandle, RetentionSweeper, StorageConfig};

/// Start the hourly retention sweeper as a background task
pub fn start_retention_sweeper(db: DatabaseHandle, storage: &StorageConfig) {
    info!(
        "Starting retention sweeper: hourly, purging rejected applicants after {} hours",
        storage.retention.grace_period.num_hours()
    );

    let sweeper = Arc::new(RetentionSweeper::new(
        db,
        AssetStore::new(&storage.uploads_dir),
        storage.retention,
    ));

    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            tokio::time::sleep(delay_until(now, next_hourly_run(now))).await;

            debug!("Running scheduled retention sweep...");
            let sweeper = Arc::clone(&sweeper);
            match tokio::task::spawn_blocking(move || sweeper.run_once(Utc::now())).await {
                Ok(Ok(report)) => {
                    if report.purged > 0 {
                        info!("Scheduled retention sweep purged {} applicant(s)", report.purged);
                    }
                }
                Ok(Err(e)) => error!("Scheduled retention sweep failed: {}", e),
                Err(e) => error!("Retention sweep task panicked: {}", e),
            }
        }
    });
}

/// Start the daily auto-backup as a background task
pub fn start_auto_backup_scheduler(db: DatabaseHandle, storage: &StorageConfig) {
    let schedule = storage.schedule;
    info!(
        "Starting auto-backup scheduler: daily at {} (UTC{}) into {}",
        schedule.auto_backup_at.format("%H:%M"),
        schedule.utc_offset,
        storage.auto_backup_path.display()
    );

    let auto = Arc::new(AutoSnapshot::new(storage).with_handle(db));

    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = schedule.next_daily_run(now);
            debug!("Next auto-backup at {}", next);
            tokio::time::sleep(delay_until(now, next)).await;

            info!("Running scheduled auto-backup...");
            let auto = Arc::clone(&auto);
            match tokio::task::spawn_blocking(move || auto.run_once()).await {
                Ok(Ok(Some(bytes))) => info!("Auto-backup completed ({} bytes)", bytes),
                Ok(Ok(None)) => info!("Auto-backup skipped: no database file yet"),
                Ok(Err(e)) => error!("Auto-backup failed: {}", e),
                Err(e) => error!("Auto-backup task panicked: {}", e),
            }
        }
    });
}

/// Time to sleep from `now` until `next`, zero if `next` has passed
fn delay_until(now: DateTime<Utc>, next: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_delay_until_future() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap();
        let next = next_hourly_run(now);
        assert_eq!(delay_until(now, next), Duration::from_secs(45 * 60));
    }

    #[test]
    fn test_delay_until_past_is_zero() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap();
        let earlier = now - chrono::Duration::minutes(5);
        assert_eq!(delay_until(now, earlier), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_schedulers_start_inside_runtime() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = StorageConfig::under(dir.path());
        let db = DatabaseHandle::open(&storage.db_path).unwrap();

        // Spawning must not block or panic
        start_retention_sweeper(db.clone(), &storage);
        start_auto_backup_scheduler(db, &storage);
    }
}
