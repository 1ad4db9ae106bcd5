//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `resolve_storage` - Build the storage layout from env and flags
//! - `open_db` - Shared utility to open the database
//! - `cmd_init` - Initialize the database
//! - `cmd_audit` - Print the audit log

use std::path::Path;

use anyhow::{Context, Result};
use aloha_core::{Database, StorageConfig};

/// Storage layout from the environment, with `--volume` and `--db` applied on top
pub fn resolve_storage(db: Option<&Path>, volume: Option<&Path>) -> StorageConfig {
    let env = StorageConfig::from_env();

    let mut storage = match volume {
        Some(root) => StorageConfig {
            retention: env.retention,
            schedule: env.schedule,
            ..StorageConfig::on_volume(root)
        },
        None => env,
    };

    if let Some(db) = db {
        storage.db_path = db.to_path_buf();
    }

    storage
}

/// Open the database, creating it and running migrations if needed
pub fn open_db(storage: &StorageConfig) -> Result<Database> {
    Database::open(&storage.db_path).with_context(|| {
        format!("Failed to open database at {}", storage.db_path.display())
    })
}

pub fn cmd_init(storage: &StorageConfig) -> Result<()> {
    println!("🔧 Initializing database at {}...", storage.db_path.display());

    let db = open_db(storage)?;

    std::fs::create_dir_all(&storage.uploads_dir).with_context(|| {
        format!(
            "Failed to create uploads directory {}",
            storage.uploads_dir.display()
        )
    })?;
    println!("   Uploads: {}", storage.uploads_dir.display());
    println!("   Applicants: {}", db.count_applicants()?);

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Start the admin API: ALOHA_API_KEYS=<key> aloha serve");
    println!("  2. Take a snapshot: aloha backup export");

    Ok(())
}

pub fn cmd_audit(storage: &StorageConfig, page: i64, limit: i64) -> Result<()> {
    let db = open_db(storage)?;
    let result = db
        .list_audit_log(page.max(1), limit.clamp(1, aloha_server::MAX_PAGE_LIMIT))
        .context("Failed to read audit log")?;

    if result.entries.is_empty() {
        println!("No audit entries");
        return Ok(());
    }

    println!("{:<20} {:<24} {:<16} DETAILS", "TIMESTAMP", "ACTOR", "ACTION");
    println!("{}", "-".repeat(80));
    for entry in &result.entries {
        println!(
            "{:<20} {:<24} {:<16} {}",
            entry.timestamp,
            entry.actor,
            entry.action,
            entry.details.as_deref().unwrap_or("")
        );
    }
    println!();
    println!(
        "Page {} of {} ({} entries)",
        result.pagination.current_page,
        result.pagination.total_pages.max(1),
        result.pagination.total_records
    );

    Ok(())
}
