//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `backup` - Snapshot export and offline restore
//! - `core` - Core commands (init, audit) and shared utilities (resolve_storage, open_db)
//! - `maintenance` - Retention sweep and auto-backup, run once
//! - `serve` - Web server command

pub mod backup;
pub mod core;
pub mod maintenance;
pub mod serve;

// Re-export command functions for main.rs
pub use backup::*;
pub use core::*;
pub use maintenance::*;
pub use serve::*;

/// Format a byte count for display
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
