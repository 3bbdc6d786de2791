//! Checkpoint persistence port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Checkpoint, CheckpointSummary};

/// Durable storage for run snapshots.
///
/// Loads must fail with `CorruptCheckpoint` rather than return a partially
/// reconstructed snapshot.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> DomainResult<()>;

    /// Latest checkpoint of `run_id`, by sequence.
    async fn load_latest(&self, run_id: Uuid) -> DomainResult<Option<Checkpoint>>;

    async fn load(&self, checkpoint_id: Uuid) -> DomainResult<Option<Checkpoint>>;

    /// Most recent checkpoints across all runs, newest first.
    async fn list(&self, limit: usize) -> DomainResult<Vec<CheckpointSummary>>;

    /// Run with the most recently written checkpoint.
    async fn latest_run(&self) -> DomainResult<Option<Uuid>>;

    /// Delete every checkpoint of `run_id`. Returns how many were removed.
    async fn discard(&self, run_id: Uuid) -> DomainResult<u64>;
}
