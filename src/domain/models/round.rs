//! Round outcomes reported by the round executor.
//!
//! A round is the atomic unit the control loop reasons about: one complete
//! piece of external work plus its quality measurement and problem report.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::context::Turn;

/// Pipeline stage a round's work belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Design,
    Generation,
    Evaluation,
}

impl Category {
    /// All categories in declaration order.
    pub const ALL: [Self; 3] = [Self::Design, Self::Generation, Self::Evaluation];

    /// Categories whose budgets are reset when a redesign is approved.
    pub const EXECUTION: [Self; 2] = [Self::Generation, Self::Evaluation];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Design => "design",
            Self::Generation => "generation",
            Self::Evaluation => "evaluation",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "design" => Some(Self::Design),
            "generation" => Some(Self::Generation),
            "evaluation" => Some(Self::Evaluation),
            _ => None,
        }
    }

    /// Ascending fix cost: generation is cheapest to redo, design the most
    /// expensive. Used as the final tie-breaker when choosing a retry target.
    pub const fn fix_cost_rank(&self) -> u8 {
        match self {
            Self::Generation => 0,
            Self::Evaluation => 1,
            Self::Design => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Problem severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single defect reported by a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemReport {
    pub severity: Severity,
    /// Stable identifier for "the same underlying defect" across rounds.
    pub root_cause_key: String,
    /// Number of samples / artifacts affected.
    #[serde(default)]
    pub affected_count: u32,
}

impl ProblemReport {
    pub fn new(severity: Severity, root_cause_key: impl Into<String>, affected_count: u32) -> Self {
        Self {
            severity,
            root_cause_key: root_cause_key.into(),
            affected_count,
        }
    }
}

/// The execution stage asking to hand control back to design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedesignRequest {
    pub trigger_reason: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

/// Outcome of one round. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    /// Quality score in `[0.0, 1.0]`.
    pub quality: f64,
    pub category: Category,
    #[serde(default)]
    pub problems: Vec<ProblemReport>,
    #[serde(default)]
    pub tokens_spent: u64,
    /// Artifacts produced by the round, keyed by artifact name.
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    /// Interaction turns produced while doing the round's work.
    #[serde(default)]
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub redesign_request: Option<RedesignRequest>,
}

impl RoundResult {
    pub fn new(category: Category, quality: f64) -> Self {
        Self {
            quality,
            category,
            problems: Vec::new(),
            tokens_spent: 0,
            artifacts: BTreeMap::new(),
            turns: Vec::new(),
            redesign_request: None,
        }
    }

    pub fn with_problems(mut self, problems: Vec<ProblemReport>) -> Self {
        self.problems = problems;
        self
    }

    pub const fn with_tokens(mut self, tokens_spent: u64) -> Self {
        self.tokens_spent = tokens_spent;
        self
    }

    pub fn with_artifact(mut self, name: impl Into<String>, location: impl Into<String>) -> Self {
        self.artifacts.insert(name.into(), location.into());
        self
    }

    pub fn with_turns(mut self, turns: Vec<Turn>) -> Self {
        self.turns = turns;
        self
    }

    pub fn with_redesign_request(mut self, request: RedesignRequest) -> Self {
        self.redesign_request = Some(request);
        self
    }

    /// Highest severity among the round's problems, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        self.problems.iter().map(|p| p.severity).max()
    }

    /// Reject malformed collaborator output before it reaches the ledgers.
    pub fn validate(&self) -> Result<(), String> {
        if !self.quality.is_finite() || !(0.0..=1.0).contains(&self.quality) {
            return Err(format!("quality {} is outside [0, 1]", self.quality));
        }
        if let Some(p) = self.problems.iter().find(|p| p.root_cause_key.trim().is_empty()) {
            return Err(format!("{} problem has an empty root cause key", p.severity));
        }
        Ok(())
    }
}
