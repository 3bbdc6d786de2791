//! Human-in-the-loop approval port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::RunState;

/// What the human is asked to approve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub run_id: Uuid,
    pub state: RunState,
    pub summary: String,
}

/// A human's answer to an [`ApprovalRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    /// Optional feedback is fed back into the context log.
    Reject {
        #[serde(default)]
        feedback: Option<String>,
    },
}

impl ApprovalDecision {
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approve)
    }
}

/// Blocks until a human answers. May wait indefinitely; the coordinator
/// races it against cancellation.
#[async_trait]
pub trait ApprovalSignal: Send + Sync {
    async fn request(&self, request: ApprovalRequest) -> DomainResult<ApprovalDecision>;
}
