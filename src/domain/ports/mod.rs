//! Port trait definitions (Hexagonal Architecture)
//!
//! The control loop consumes four collaborators through these traits:
//! - RoundExecutor: performs one round of external work
//! - ApprovalSignal: human approval at gated transitions
//! - Summarizer: condenses the context log during compaction
//! - CheckpointStore: persists run snapshots

pub mod approval_signal;
pub mod checkpoint_store;
pub mod round_executor;
pub mod summarizer;

pub use approval_signal::{ApprovalDecision, ApprovalRequest, ApprovalSignal};
pub use checkpoint_store::CheckpointStore;
pub use round_executor::{RoundExecutor, RoundRequest};
pub use summarizer::Summarizer;
