use serde::{Deserialize, Serialize};

use super::context::AgentRole;
use super::cost::CostProfile;
use super::round::{Category, Severity};

/// Main configuration structure for synthloop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Quality target and convergence detection
    #[serde(default)]
    pub quality: QualityConfig,

    /// Attempt budgets per category and for the whole run
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Problem classification thresholds
    #[serde(default)]
    pub problems: ProblemConfig,

    /// Cost-benefit estimation
    #[serde(default)]
    pub cost: CostConfig,

    /// Context compaction
    #[serde(default)]
    pub compaction: CompactionConfig,

    /// Design stage gate
    #[serde(default)]
    pub design: DesignConfig,

    /// Collaborator retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Checkpoint database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Quality target, convergence window and oscillation detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QualityConfig {
    /// Score at or above which the run succeeds
    #[serde(default = "default_quality_target")]
    pub quality_target: f64,

    /// Number of most recent scores inspected for convergence/oscillation
    #[serde(default = "default_convergence_window")]
    pub convergence_window: usize,

    /// Window spread below which quality is considered converged
    #[serde(default = "default_min_improvement")]
    pub min_improvement: f64,

    /// Sign flips within the window that mark oscillation
    #[serde(default = "default_oscillation_flips")]
    pub oscillation_flips: usize,
}

const fn default_quality_target() -> f64 {
    0.85
}

const fn default_convergence_window() -> usize {
    5
}

const fn default_min_improvement() -> f64 {
    0.02
}

const fn default_oscillation_flips() -> usize {
    3
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            quality_target: default_quality_target(),
            convergence_window: default_convergence_window(),
            min_improvement: default_min_improvement(),
            oscillation_flips: default_oscillation_flips(),
        }
    }
}

/// Soft/hard attempt limits for one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CategoryLimits {
    pub soft_limit: u32,
    pub hard_limit: u32,

    /// Worst outstanding severity still worth a retry past the soft limit
    #[serde(default = "default_review_max_severity")]
    pub review_max_severity: Severity,
}

const fn default_review_max_severity() -> Severity {
    Severity::Medium
}

impl CategoryLimits {
    pub const fn new(soft_limit: u32, hard_limit: u32) -> Self {
        Self {
            soft_limit,
            hard_limit,
            review_max_severity: default_review_max_severity(),
        }
    }
}

/// Attempt budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetConfig {
    #[serde(default = "default_design_limits")]
    pub design: CategoryLimits,

    #[serde(default = "default_generation_limits")]
    pub generation: CategoryLimits,

    #[serde(default = "default_evaluation_limits")]
    pub evaluation: CategoryLimits,

    /// Safety valve on the total number of rounds in a run
    #[serde(default = "default_global_hard_limit")]
    pub global_hard_limit: u32,

    /// Token allowance for the whole run; remaining budget for cost-benefit
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,
}

const fn default_design_limits() -> CategoryLimits {
    CategoryLimits::new(3, 5)
}

const fn default_generation_limits() -> CategoryLimits {
    CategoryLimits::new(10, 30)
}

const fn default_evaluation_limits() -> CategoryLimits {
    CategoryLimits::new(20, 50)
}

const fn default_global_hard_limit() -> u32 {
    100
}

const fn default_token_budget() -> u64 {
    2_000_000
}

impl BudgetConfig {
    pub const fn category(&self, category: Category) -> &CategoryLimits {
        match category {
            Category::Design => &self.design,
            Category::Generation => &self.generation,
            Category::Evaluation => &self.evaluation,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            design: default_design_limits(),
            generation: default_generation_limits(),
            evaluation: default_evaluation_limits(),
            global_hard_limit: default_global_hard_limit(),
            token_budget: default_token_budget(),
        }
    }
}

/// Problem classification thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProblemConfig {
    /// Share of critical problems above which a round is a systemic defect
    #[serde(default = "default_critical_fraction_threshold")]
    pub critical_fraction_threshold: f64,

    /// Recurrences of one critical root cause that force escalation
    #[serde(default = "default_repeated_critical_threshold")]
    pub repeated_critical_threshold: u32,
}

const fn default_critical_fraction_threshold() -> f64 {
    0.30
}

const fn default_repeated_critical_threshold() -> u32 {
    3
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            critical_fraction_threshold: default_critical_fraction_threshold(),
            repeated_critical_threshold: default_repeated_critical_threshold(),
        }
    }
}

/// Cost-benefit estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CostConfig {
    /// Cost units per percentage point of improvement considered too expensive
    #[serde(default = "default_cost_per_percent_ceiling")]
    pub cost_per_percent_ceiling: f64,

    /// Quality below which expensive improvement is abandoned
    #[serde(default = "default_low_quality_floor")]
    pub low_quality_floor: f64,

    /// Moving-average weight for observed rounds; 0 keeps profiles fixed
    #[serde(default)]
    pub learning_rate: f64,

    #[serde(default = "default_design_profile")]
    pub design: CostProfile,

    #[serde(default = "default_generation_profile")]
    pub generation: CostProfile,

    #[serde(default = "default_evaluation_profile")]
    pub evaluation: CostProfile,
}

const fn default_cost_per_percent_ceiling() -> f64 {
    1500.0
}

const fn default_low_quality_floor() -> f64 {
    0.70
}

const fn default_design_profile() -> CostProfile {
    CostProfile::new(12_000.0, 0.10)
}

const fn default_generation_profile() -> CostProfile {
    CostProfile::new(6_000.0, 0.05)
}

const fn default_evaluation_profile() -> CostProfile {
    CostProfile::new(4_000.0, 0.03)
}

impl CostConfig {
    pub const fn profile(&self, category: Category) -> CostProfile {
        match category {
            Category::Design => self.design,
            Category::Generation => self.generation,
            Category::Evaluation => self.evaluation,
        }
    }
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            cost_per_percent_ceiling: default_cost_per_percent_ceiling(),
            low_quality_floor: default_low_quality_floor(),
            learning_rate: 0.0,
            design: default_design_profile(),
            generation: default_generation_profile(),
            evaluation: default_evaluation_profile(),
        }
    }
}

/// Context capacity for one agent role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RoleCompaction {
    /// Maximum context capacity in tokens
    pub capacity_tokens: usize,

    /// Most recent complete turns kept verbatim by a compaction
    pub recent_turns_kept: usize,
}

/// Context compaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CompactionConfig {
    /// Fraction of capacity at which compaction triggers
    #[serde(default = "default_trigger_fraction")]
    pub trigger_fraction: f64,

    /// Keep the first turn (the original requirement) ahead of the summary
    #[serde(default)]
    pub preserve_first_turn: bool,

    #[serde(default = "default_design_compaction")]
    pub design: RoleCompaction,

    #[serde(default = "default_execution_compaction")]
    pub execution: RoleCompaction,
}

const fn default_trigger_fraction() -> f64 {
    0.72
}

const fn default_design_compaction() -> RoleCompaction {
    RoleCompaction {
        capacity_tokens: 200_000,
        recent_turns_kept: 3,
    }
}

const fn default_execution_compaction() -> RoleCompaction {
    RoleCompaction {
        capacity_tokens: 200_000,
        recent_turns_kept: 5,
    }
}

impl CompactionConfig {
    pub const fn role(&self, role: AgentRole) -> &RoleCompaction {
        match role {
            AgentRole::Design => &self.design,
            AgentRole::Execution => &self.execution,
        }
    }

    /// Size in tokens at which the log for `role` must be compacted.
    pub fn threshold_tokens(&self, role: AgentRole) -> usize {
        (self.role(role).capacity_tokens as f64 * self.trigger_fraction) as usize
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            trigger_fraction: default_trigger_fraction(),
            preserve_first_turn: false,
            design: default_design_compaction(),
            execution: default_execution_compaction(),
        }
    }
}

/// Design stage gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DesignConfig {
    /// Artifact names that make a design artifact set structurally complete
    #[serde(default = "default_required_artifacts")]
    pub required_artifacts: Vec<String>,
}

fn default_required_artifacts() -> Vec<String> {
    vec!["business_rules".to_string(), "scenario_design".to_string()]
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            required_artifacts: default_required_artifacts(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1_000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` checkpoint database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".synthloop/synthloop.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (stderr only when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Rotation for file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
