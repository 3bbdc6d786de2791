//! Decisions and the explicit per-run context they are computed from.
//!
//! [`RunContext`] gathers every ledger the decision engine reads. The run
//! coordinator is its only mutator; the engine itself is a pure function of
//! it, so any decision can be replayed from a checkpoint.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::budget::BudgetLedger;
use super::config::Config;
use super::cost::CostBenefitEstimator;
use super::problems::ProblemRegistry;
use super::quality::QualityHistory;
use super::round::{Category, ProblemReport, RedesignRequest, RoundResult, Severity};
use crate::domain::errors::{DomainError, DomainResult};

/// Why a run stopped on budget grounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum ExhaustionCause {
    /// The global round counter hit its hard limit.
    GlobalHardLimit,
    /// Every category with outstanding problems was denied a retry.
    CategoryLimits,
    /// A collaborator kept failing after its retries.
    CollaboratorFailure { collaborator: String },
}

impl ExhaustionCause {
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::GlobalHardLimit => "global_hard_limit",
            Self::CategoryLimits => "category_limits",
            Self::CollaboratorFailure { .. } => "collaborator_failure",
        }
    }
}

/// The one action chosen after a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    StopSuccess { reason: String },
    StopConverged { reason: String },
    StopOscillating { reason: String },
    StopSystemic { reason: String },
    StopBudgetExhausted { cause: ExhaustionCause, reason: String },
    StopCostIneffective { reason: String },
    Continue {
        category: Category,
        /// Granted past the category's soft limit.
        #[serde(default)]
        review: bool,
    },
}

impl Decision {
    pub fn collaborator_failure(collaborator: &str, message: &str) -> Self {
        Self::StopBudgetExhausted {
            cause: ExhaustionCause::CollaboratorFailure {
                collaborator: collaborator.to_string(),
            },
            reason: format!("budget exhausted: collaborator failure: {collaborator}: {message}"),
        }
    }

    pub const fn is_stop(&self) -> bool {
        !matches!(self, Self::Continue { .. })
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StopSuccess { .. } => "stop_success",
            Self::StopConverged { .. } => "stop_converged",
            Self::StopOscillating { .. } => "stop_oscillating",
            Self::StopSystemic { .. } => "stop_systemic",
            Self::StopBudgetExhausted { .. } => "stop_budget_exhausted",
            Self::StopCostIneffective { .. } => "stop_cost_ineffective",
            Self::Continue { .. } => "continue",
        }
    }

    /// Machine-readable cause, distinct for collaborator failures.
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::StopBudgetExhausted { cause, .. } => cause.reason_code(),
            other => other.as_str(),
        }
    }

    /// Human-readable reason naming the triggering signal.
    pub fn reason(&self) -> String {
        match self {
            Self::StopSuccess { reason }
            | Self::StopConverged { reason }
            | Self::StopOscillating { reason }
            | Self::StopSystemic { reason }
            | Self::StopBudgetExhausted { reason, .. }
            | Self::StopCostIneffective { reason } => reason.clone(),
            Self::Continue { category, review } => {
                if *review {
                    format!("continue: retry {category} (past soft limit, reviewed)")
                } else {
                    format!("continue: retry {category}")
                }
            }
        }
    }

    /// Whether this stop should be escalated for a redesign instead of ending the run.
    pub const fn escalates_to_redesign(&self) -> bool {
        matches!(
            self,
            Self::StopSystemic { .. } | Self::StopBudgetExhausted { .. }
        )
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.reason())
    }
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

/// All per-run ledgers. Owned by one run, never shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub ledger: BudgetLedger,
    pub history: QualityHistory,
    pub registry: ProblemRegistry,
    /// Problems of the most recent round of each category.
    pub outstanding: BTreeMap<Category, Vec<ProblemReport>>,
    pub cost: CostBenefitEstimator,
    pub tokens_spent: u64,
    /// Number of rounds recorded so far; the next round gets this index + 1.
    pub round_index: u32,
    pub last_category: Option<Category>,
    /// Category the next round will run in.
    pub next_category: Category,
    /// Design artifacts accumulated since the last redesign.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    /// Redesign asked for by the most recent round, if any.
    #[serde(default)]
    pub redesign_request: Option<RedesignRequest>,
}

impl RunContext {
    pub fn new(config: &Config) -> Self {
        Self {
            ledger: BudgetLedger::from_config(&config.budget),
            history: QualityHistory::new(),
            registry: ProblemRegistry::new(),
            outstanding: BTreeMap::new(),
            cost: CostBenefitEstimator::new(&config.cost, config.quality.quality_target),
            tokens_spent: 0,
            round_index: 0,
            last_category: None,
            next_category: Category::Design,
            artifacts: BTreeMap::new(),
            redesign_request: None,
        }
    }

    /// Fold a completed round into every ledger.
    ///
    /// Fails without mutating anything when the result is malformed or the
    /// round would cross a hard limit.
    pub fn record_round(&mut self, result: &RoundResult) -> DomainResult<u32> {
        result
            .validate()
            .map_err(|message| DomainError::collaborator("round executor", message))?;
        self.ledger.record_attempt(result.category)?;

        let previous = self.history.window(1).first().copied();
        self.history.append(result.quality);
        self.round_index += 1;
        self.registry.record(self.round_index, &result.problems);
        self.outstanding
            .insert(result.category, result.problems.clone());
        self.last_category = Some(result.category);
        self.tokens_spent = self.tokens_spent.saturating_add(result.tokens_spent);
        self.redesign_request.clone_from(&result.redesign_request);
        for (name, location) in &result.artifacts {
            self.artifacts.insert(name.clone(), location.clone());
        }
        if let Some(previous) = previous {
            self.cost.observe(
                result.category,
                result.tokens_spent as f64,
                result.quality - previous,
            );
        }
        Ok(self.round_index)
    }

    /// Problems of the most recent round, whatever its category.
    pub fn latest_problems(&self) -> &[ProblemReport] {
        self.last_category
            .and_then(|c| self.outstanding.get(&c))
            .map_or(&[], Vec::as_slice)
    }

    /// Worst outstanding severity for `category`.
    pub fn outstanding_severity(&self, category: Category) -> Option<Severity> {
        self.outstanding
            .get(&category)
            .and_then(|problems| problems.iter().map(|p| p.severity).max())
    }

    /// Categories whose latest round left problems behind.
    pub fn categories_with_problems(&self) -> Vec<Category> {
        self.outstanding
            .iter()
            .filter(|(_, problems)| !problems.is_empty())
            .map(|(category, _)| *category)
            .collect()
    }

    pub fn remaining_token_budget(&self, token_budget: u64) -> u64 {
        token_budget.saturating_sub(self.tokens_spent)
    }

    /// Names from `required` that are missing or empty in the artifact set.
    pub fn missing_artifacts(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| {
                self.artifacts
                    .get(name.as_str())
                    .is_none_or(|location| location.trim().is_empty())
            })
            .cloned()
            .collect()
    }

    /// Return to design: fresh execution budgets, a new quality epoch, and a
    /// clean artifact set. The global counter is kept.
    pub fn begin_redesign(&mut self) {
        self.ledger.reset_categories(&Category::EXECUTION);
        for category in Category::EXECUTION {
            self.outstanding.remove(&category);
        }
        self.history.begin_epoch();
        self.artifacts.clear();
        self.redesign_request = None;
        self.next_category = Category::Design;
    }

    /// Design approved: execution starts on its own quality epoch.
    pub fn begin_execution(&mut self) {
        self.outstanding.remove(&Category::Design);
        self.redesign_request = None;
        self.history.begin_epoch();
        self.next_category = Category::Generation;
    }
}
