//! Concurrent execution of independent runs.
//!
//! Each coordinator owns its ledgers, so runs share nothing but the
//! collaborators' own synchronization.

use futures::stream::{self, StreamExt};
use tracing::info;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::services::run_coordinator::{RunCoordinator, RunOutcome};

/// Bounded-concurrency driver for independent runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPool {
    max_concurrent: usize,
}

impl RunPool {
    /// A pool of at least one slot.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Drive every coordinator to completion, at most `max_concurrent` at a
    /// time. Results come back in completion order, keyed by run id.
    pub async fn run_all(
        &self,
        coordinators: Vec<RunCoordinator>,
    ) -> Vec<(Uuid, DomainResult<RunOutcome>)> {
        info!(
            runs = coordinators.len(),
            max_concurrent = self.max_concurrent,
            "Starting run pool"
        );
        stream::iter(coordinators)
            .map(|mut coordinator| async move {
                let run_id = coordinator.run_id();
                (run_id, coordinator.run().await)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }
}

impl Default for RunPool {
    fn default() -> Self {
        Self::new(4)
    }
}
