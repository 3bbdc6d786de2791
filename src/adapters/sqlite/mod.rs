//! SQLite persistence for run checkpoints.
//!
//! One table, append-only per run. The full snapshot is stored as JSON next
//! to a few indexed columns used by listing.

pub mod checkpoint_repository;
pub mod connection;
pub mod migrations;

pub use checkpoint_repository::SqliteCheckpointStore;
pub use connection::{create_pool, create_test_pool, database_url, ConnectionError, PoolConfig};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

pub(crate) fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(format!("bad uuid '{s}': {e}")))
}

/// Stored timestamps are RFC 3339 in UTC.
pub(crate) fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::SerializationError(format!("bad timestamp '{s}': {e}")))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreInitError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

/// Open the checkpoint database and bring its schema up to date.
pub async fn initialize_database(
    database_url: &str,
    config: Option<PoolConfig>,
) -> Result<SqlitePool, StoreInitError> {
    let pool = create_pool(database_url, config).await?;
    let applied = Migrator::new(pool.clone())
        .run_embedded_migrations(all_embedded_migrations())
        .await?;
    debug!(database_url, applied, "Checkpoint database ready");
    Ok(pool)
}

/// In-memory database with the schema applied. Used by tests.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, StoreInitError> {
    let pool = create_test_pool().await?;
    Migrator::new(pool.clone())
        .run_embedded_migrations(all_embedded_migrations())
        .await?;
    Ok(pool)
}
