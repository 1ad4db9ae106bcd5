//! Server command implementation

use anyhow::Result;
use aloha_core::{DatabaseHandle, RestartPolicy, StorageConfig};

use super::open_db;

pub async fn cmd_serve(
    storage: StorageConfig,
    host: &str,
    port: u16,
    no_auth: bool,
    restart: RestartPolicy,
) -> Result<()> {
    println!("🚀 Starting Aloha admin server...");
    println!("   Database: {}", storage.db_path.display());
    println!("   Uploads: {}", storage.uploads_dir.display());
    println!("   Auto-backup slot: {}", storage.auto_backup_path.display());
    println!("   Listening: http://{}:{}", host, port);

    // Parse API keys from environment (comma-separated)
    let api_keys = aloha_server::parse_api_keys(&std::env::var("ALOHA_API_KEYS").unwrap_or_default());

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if api_keys.is_empty() {
        println!("   🔒 Authentication: required, but ALOHA_API_KEYS is empty");
    } else {
        println!(
            "   🔑 API keys: {} configured (ALOHA_API_KEYS)",
            api_keys.len()
        );
    }
    println!("   ♻️  After restore: {}", restart.as_str());
    println!();
    println!("   Press Ctrl+C to stop");

    let db = DatabaseHandle::from_database(open_db(&storage)?);

    let config = aloha_server::ServerConfig {
        require_auth: !no_auth,
        api_keys,
        restart,
    };

    aloha_server::serve_with_config(db, storage, host, port, config).await?;

    Ok(())
}
