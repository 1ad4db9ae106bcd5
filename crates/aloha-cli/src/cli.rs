//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use aloha_core::RestartPolicy;
use clap::{Parser, Subcommand};

/// Aloha - persistent-state tooling for the recruitment admin
#[derive(Parser)]
#[command(name = "aloha")]
#[command(about = "Backup, restore and retention for the Aloha recruitment admin", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path (overrides VOLUME_PATH / ALOHA_HOME)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Volume directory holding the database, uploads and auto-backup slot
    ///
    /// Same layout as setting VOLUME_PATH.
    #[arg(long, global = true)]
    pub volume: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and uploads directory
    Init,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, every API request needs a key from ALOHA_API_KEYS.
        #[arg(long)]
        no_auth: bool,

        /// What to do after a committed restore: exit or reopen
        ///
        /// `exit` needs a process supervisor that restarts the server.
        #[arg(long, default_value = "exit")]
        restart: RestartPolicy,
    },

    /// Snapshot export and restore
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Purge rejected applicants past the retention grace period
    Sweep,

    /// Copy the database into the auto-backup slot
    AutoBackup,

    /// Show the audit log, newest first
    Audit {
        /// Page number
        #[arg(long, default_value = "1")]
        page: i64,

        /// Entries per page
        #[arg(short, long, default_value = "15")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum BackupAction {
    /// Write a snapshot archive of the database and uploads
    Export {
        /// Output file (defaults to aloha_backup_<date>.zip in the current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Replace the database and merge uploads from a snapshot archive
    Restore {
        /// Archive produced by `aloha backup export` or the backup endpoint
        #[arg(short, long)]
        file: PathBuf,

        /// Restore over an existing database without refusing
        #[arg(long)]
        force: bool,
    },
}
