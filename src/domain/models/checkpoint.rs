//! Serializable run snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::ContextLog;
use super::decision::{Decision, RunContext};
use super::run_state::RunState;
use crate::domain::errors::{DomainError, DomainResult};

/// Everything needed to re-enter a run exactly where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: Uuid,
    pub run_id: Uuid,
    /// Monotonic per run; the latest checkpoint has the highest sequence.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub state: RunState,
    pub context: RunContext,
    pub context_log: ContextLog,
    pub last_decision: Option<Decision>,
    /// Set once the operator cancelled the run; a resumed run reports it.
    #[serde(default)]
    pub cancelled: bool,
}

impl Checkpoint {
    pub fn new(
        run_id: Uuid,
        sequence: u64,
        state: RunState,
        context: RunContext,
        context_log: ContextLog,
        last_decision: Option<Decision>,
    ) -> Self {
        Self {
            checkpoint_id: Uuid::new_v4(),
            run_id,
            sequence,
            created_at: Utc::now(),
            state,
            context,
            context_log,
            last_decision,
            cancelled: false,
        }
    }

    pub fn round_index(&self) -> u32 {
        self.context.round_index
    }

    pub fn last_quality(&self) -> Option<f64> {
        self.context.history.latest()
    }

    /// Reject snapshots whose ledgers contradict each other. A checkpoint
    /// that fails here is never patched up; the operator discards it.
    pub fn validate(&self) -> DomainResult<()> {
        let corrupt = |reason: String| DomainError::CorruptCheckpoint {
            checkpoint_id: self.checkpoint_id.to_string(),
            reason,
        };

        self.context.ledger.validate().map_err(corrupt)?;

        let rounds = self.context.round_index as usize;
        if self.context.history.len() != rounds {
            return Err(corrupt(format!(
                "quality history has {} scores for {rounds} rounds",
                self.context.history.len()
            )));
        }
        if self.context.history.epoch_start() > rounds {
            return Err(corrupt(format!(
                "quality epoch starts at {} past {rounds} rounds",
                self.context.history.epoch_start()
            )));
        }
        if self.context.ledger.global().attempts != self.context.round_index {
            return Err(corrupt(format!(
                "global attempts {} disagree with round index {}",
                self.context.ledger.global().attempts,
                self.context.round_index
            )));
        }
        Ok(())
    }

    pub fn summary(&self) -> CheckpointSummary {
        CheckpointSummary {
            checkpoint_id: self.checkpoint_id,
            run_id: self.run_id,
            sequence: self.sequence,
            created_at: self.created_at,
            state: self.state,
            round_index: self.round_index(),
            last_quality: self.last_quality(),
        }
    }
}

/// Listing row for a stored checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub checkpoint_id: Uuid,
    pub run_id: Uuid,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub state: RunState,
    pub round_index: u32,
    pub last_quality: Option<f64>,
}
