pub mod budget;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod cost;
pub mod decision;
pub mod problems;
pub mod quality;
pub mod round;
pub mod run_state;

pub use budget::{
    BudgetLedger, CategoryBudget, GlobalBudget, RetryVerdict, RetryWorthinessPolicy,
    SeverityCeilingPolicy,
};
pub use checkpoint::{Checkpoint, CheckpointSummary};
pub use config::{
    BudgetConfig, CategoryLimits, CompactionConfig, Config, CostConfig, DatabaseConfig,
    DesignConfig, LoggingConfig, ProblemConfig, QualityConfig, RetryConfig, RoleCompaction,
};
pub use context::{estimate_tokens, truncate_middle, AgentRole, ContextLog, Turn, TurnRole};
pub use cost::{CostAssessment, CostBenefitEstimator, CostProfile};
pub use decision::{Decision, ExhaustionCause, RunContext};
pub use problems::{Classification, ProblemClassifier, ProblemRegistry, RootCauseRecord};
pub use quality::QualityHistory;
pub use round::{Category, ProblemReport, RedesignRequest, RoundResult, Severity};
pub use run_state::RunState;
