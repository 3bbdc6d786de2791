//! CLI command implementations.

pub mod checkpoint;
pub mod config;
pub mod init;
pub mod run;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig, SqliteCheckpointStore};
use crate::domain::models::Config;

/// Open the configured checkpoint database, applying pending migrations.
pub async fn open_store(config: &Config) -> Result<Arc<SqliteCheckpointStore>> {
    let url = database_url(&config.database.path);
    let pool = initialize_database(&url, Some(PoolConfig::from_database_config(&config.database)))
        .await
        .with_context(|| format!("Failed to open checkpoint database {}", config.database.path))?;
    Ok(Arc::new(SqliteCheckpointStore::new(pool)))
}
