//! Run Coordinator state machine variable.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::context::AgentRole;

/// Position of a run in the coordinator's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Designing,
    AwaitingDesignApproval,
    Executing,
    AwaitingRootCauseReview,
    AwaitingRedesignApproval,
    Done,
}

impl RunState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Designing => "designing",
            Self::AwaitingDesignApproval => "awaiting_design_approval",
            Self::Executing => "executing",
            Self::AwaitingRootCauseReview => "awaiting_root_cause_review",
            Self::AwaitingRedesignApproval => "awaiting_redesign_approval",
            Self::Done => "done",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "designing" => Some(Self::Designing),
            "awaiting_design_approval" => Some(Self::AwaitingDesignApproval),
            "executing" => Some(Self::Executing),
            "awaiting_root_cause_review" => Some(Self::AwaitingRootCauseReview),
            "awaiting_redesign_approval" => Some(Self::AwaitingRedesignApproval),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// States in which the coordinator blocks on a human signal.
    pub const fn awaits_approval(&self) -> bool {
        matches!(
            self,
            Self::AwaitingDesignApproval
                | Self::AwaitingRootCauseReview
                | Self::AwaitingRedesignApproval
        )
    }

    /// Agent role whose context capacity governs compaction in this state.
    pub const fn agent_role(&self) -> AgentRole {
        match self {
            Self::Designing | Self::AwaitingDesignApproval => AgentRole::Design,
            _ => AgentRole::Execution,
        }
    }

    /// Valid transitions from this state.
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Designing => vec![Self::AwaitingDesignApproval, Self::Done],
            Self::AwaitingDesignApproval => vec![Self::Executing, Self::Designing, Self::Done],
            Self::Executing => vec![
                Self::Executing,
                Self::Done,
                Self::AwaitingRedesignApproval,
                Self::AwaitingRootCauseReview,
            ],
            Self::AwaitingRootCauseReview => vec![Self::Designing, Self::Executing, Self::Done],
            Self::AwaitingRedesignApproval => vec![Self::Designing, Self::Done],
            Self::Done => vec![],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
