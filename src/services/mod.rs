pub mod context_compactor;
pub mod decision_engine;
pub mod retry;
pub mod run_coordinator;
pub mod run_pool;

pub use context_compactor::{CompactionEvent, ContextCompactor};
pub use decision_engine::DecisionEngine;
pub use retry::RetryPolicy;
pub use run_coordinator::{Collaborators, RunCoordinator, RunHandle, RunOutcome};
pub use run_pool::RunPool;
