//! Round executor port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Category, ContextLog, RoundResult};

/// Everything the executor is told about the round it must perform.
#[derive(Debug, Clone)]
pub struct RoundRequest {
    pub run_id: Uuid,
    /// 1-based index the round will be recorded under.
    pub round_index: u32,
    pub category: Category,
    /// Context as of the round boundary. Never compacted mid-round.
    pub context: ContextLog,
}

/// Performs one complete unit of external work.
///
/// The coordinator treats the call as atomic: partial results are never
/// observed, and a failure means the round did not happen.
#[async_trait]
pub trait RoundExecutor: Send + Sync {
    async fn execute(&self, request: RoundRequest) -> DomainResult<RoundResult>;
}
