pub mod ledger;
pub mod notices;
pub mod rows;
pub mod serve;

use anyhow::{Context, Result};
use tvtime_db::{Database, DatabaseConfig};
use tvtime_engine::EngineConfig;

/// Open the SQLite file that holds approval rows and notices.
pub async fn open_sheet(config: &EngineConfig) -> Result<Database> {
    let path = &config.approval.sheet_path;
    Database::open(DatabaseConfig { path: path.clone() })
        .await
        .with_context(|| format!("Failed to open approval sheet {}", path))
}

/// Open the engine's local database.
pub async fn open_local(config: &EngineConfig) -> Result<Database> {
    let path = &config.database.path;
    Database::open(DatabaseConfig { path: path.clone() })
        .await
        .with_context(|| format!("Failed to open database {}", path))
}

pub fn print_config(config: &EngineConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    if config.approval.api_token.is_some() {
        println!("# approval.api_token is set (hidden)");
    }
    Ok(())
}
