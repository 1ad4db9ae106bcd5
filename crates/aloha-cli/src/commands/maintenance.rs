//! One-shot runs of the background maintenance jobs

use anyhow::{Context, Result};
use chrono::Utc;
use aloha_core::{AssetStore, AutoSnapshot, DatabaseHandle, RetentionSweeper, StorageConfig};

use super::{format_size, open_db};

/// Purge rejected applicants whose grace period has passed
pub fn cmd_sweep(storage: &StorageConfig) -> Result<()> {
    println!(
        "🧹 Purging rejected applicants older than {} hours...",
        storage.retention.grace_period.num_hours()
    );

    let handle = DatabaseHandle::from_database(open_db(storage)?);
    let sweeper = RetentionSweeper::new(
        handle,
        AssetStore::new(&storage.uploads_dir),
        storage.retention,
    );
    let report = sweeper
        .run_once(Utc::now())
        .context("Retention sweep failed")?;

    println!("✅ Purged {} applicant(s)", report.purged);
    if report.asset_failures > 0 {
        println!(
            "   ⚠️  {} upload(s) could not be deleted (see log)",
            report.asset_failures
        );
    }
    if report.record_failures > 0 {
        println!(
            "   ⚠️  {} record(s) could not be deleted (see log)",
            report.record_failures
        );
    }

    Ok(())
}

/// Copy the database into the auto-backup slot
pub fn cmd_auto_backup(storage: &StorageConfig) -> Result<()> {
    let auto = AutoSnapshot::new(storage);

    match auto.run_once().context("Auto-backup failed")? {
        Some(bytes) => {
            println!(
                "✅ Auto-backup written: {} ({})",
                auto.slot().display(),
                format_size(bytes)
            );
        }
        None => {
            println!(
                "No database at {} - nothing to back up",
                storage.db_path.display()
            );
        }
    }

    Ok(())
}
