//! Aloha CLI - persistent-state tooling for the recruitment admin
//!
//! Usage:
//!   aloha init                        Initialize database
//!   aloha serve --port 3000           Start web server
//!   aloha backup export --out FILE    Write a snapshot archive
//!   aloha backup restore --file FILE  Restore from a snapshot archive
//!   aloha sweep                       Run one retention sweep
//!   aloha auto-backup                 Refresh the auto-backup slot

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let storage = commands::resolve_storage(cli.db.as_deref(), cli.volume.as_deref());

    match cli.command {
        Commands::Init => commands::cmd_init(&storage),
        Commands::Serve {
            port,
            host,
            no_auth,
            restart,
        } => commands::cmd_serve(storage, &host, port, no_auth, restart).await,
        Commands::Backup { action } => match action {
            BackupAction::Export { out } => commands::cmd_backup_export(&storage, out.as_deref()),
            BackupAction::Restore { file, force } => {
                commands::cmd_backup_restore(&storage, &file, force)
            }
        },
        Commands::Sweep => commands::cmd_sweep(&storage),
        Commands::AutoBackup => commands::cmd_auto_backup(&storage),
        Commands::Audit { page, limit } => commands::cmd_audit(&storage, page, limit),
    }
}
