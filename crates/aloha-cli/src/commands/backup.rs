//! Snapshot export and offline restore commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use aloha_core::{
    snapshot_filename, DatabaseHandle, RestartPolicy, RestoreCoordinator, SnapshotArchiver,
    StorageConfig,
};

use super::{format_size, open_db};

/// Actor recorded for audit entries written by the CLI
const CLI_ACTOR: &str = "cli";

/// Write a snapshot archive of the database and uploads
pub fn cmd_backup_export(storage: &StorageConfig, out: Option<&Path>) -> Result<()> {
    let out: PathBuf = match out {
        Some(path) => path.to_path_buf(),
        None => {
            let today = Utc::now()
                .with_timezone(&storage.schedule.utc_offset)
                .date_naive();
            PathBuf::from(snapshot_filename(today))
        }
    };

    println!("Creating snapshot archive...");

    let handle = DatabaseHandle::from_database(open_db(storage)?);
    let archiver = SnapshotArchiver::new(storage.clone(), handle.clone());
    let summary = archiver
        .write_to_file(&out)
        .with_context(|| format!("Failed to write archive {}", out.display()))?;

    handle.get()?.log_audit(
        CLI_ACTOR,
        "SYSTEM_BACKUP",
        Some(&format!(
            "Exported system backup to {} ({} assets, {} bytes)",
            out.display(),
            summary.asset_count,
            summary.total_bytes
        )),
    )?;

    println!("✅ Snapshot written: {}", out.display());
    println!(
        "   Database: {}",
        if summary.database_included {
            "included"
        } else {
            "not found (archive has uploads only)"
        }
    );
    println!("   Assets: {}", summary.asset_count);
    println!("   Size: {} (uncompressed)", format_size(summary.total_bytes));

    Ok(())
}

/// Restore the database and uploads from a snapshot archive
///
/// Runs offline: the server must not be running against the same volume.
/// The archive file is left in place.
pub fn cmd_backup_restore(storage: &StorageConfig, file: &Path, force: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Archive not found: {}", file.display());
    }

    if storage.db_path.exists() && !force {
        anyhow::bail!(
            "Database already exists at {}.\nUse --force to overwrite.",
            storage.db_path.display()
        );
    }

    if storage.db_path.exists() {
        println!(
            "⚠️  This will overwrite the existing database at {}",
            storage.db_path.display()
        );
    }

    println!("Restoring from {}...", file.display());

    let handle = DatabaseHandle::from_database(open_db(storage)?);
    let coordinator =
        RestoreCoordinator::new(storage.clone(), handle.clone(), RestartPolicy::ReopenInPlace);
    let report = coordinator
        .restore_keeping(file)
        .with_context(|| format!("Failed to restore from {}", file.display()))?;

    handle.get()?.log_audit(
        CLI_ACTOR,
        "SYSTEM_RESTORE",
        Some(&format!(
            "Restored system from {} ({} assets)",
            file.display(),
            report.assets_restored
        )),
    )?;

    println!("✅ Restore complete");
    println!("   Database: {}", storage.db_path.display());
    println!(
        "   Assets restored: {} into {}",
        report.assets_restored,
        storage.uploads_dir.display()
    );

    Ok(())
}
