//! In-memory checkpoint store for tests and ephemeral runs.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Checkpoint, CheckpointSummary};
use crate::domain::ports::CheckpointStore;

/// Keeps checkpoints in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<Vec<Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All checkpoints of `run_id`, oldest first.
    pub async fn history(&self, run_id: Uuid) -> Vec<Checkpoint> {
        self.checkpoints
            .read()
            .await
            .iter()
            .filter(|c| c.run_id == run_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> DomainResult<()> {
        let mut checkpoints = self.checkpoints.write().await;
        match checkpoints
            .iter_mut()
            .find(|c| c.checkpoint_id == checkpoint.checkpoint_id)
        {
            Some(existing) => *existing = checkpoint.clone(),
            None => checkpoints.push(checkpoint.clone()),
        }
        Ok(())
    }

    async fn load_latest(&self, run_id: Uuid) -> DomainResult<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .read()
            .await
            .iter()
            .filter(|c| c.run_id == run_id)
            .max_by_key(|c| c.sequence)
            .cloned())
    }

    async fn load(&self, checkpoint_id: Uuid) -> DomainResult<Option<Checkpoint>> {
        Ok(self
            .checkpoints
            .read()
            .await
            .iter()
            .find(|c| c.checkpoint_id == checkpoint_id)
            .cloned())
    }

    async fn list(&self, limit: usize) -> DomainResult<Vec<CheckpointSummary>> {
        Ok(self
            .checkpoints
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .map(Checkpoint::summary)
            .collect())
    }

    async fn latest_run(&self) -> DomainResult<Option<Uuid>> {
        Ok(self.checkpoints.read().await.last().map(|c| c.run_id))
    }

    async fn discard(&self, run_id: Uuid) -> DomainResult<u64> {
        let mut checkpoints = self.checkpoints.write().await;
        let before = checkpoints.len();
        checkpoints.retain(|c| c.run_id != run_id);
        Ok((before - checkpoints.len()) as u64)
    }
}
