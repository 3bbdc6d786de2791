//! Per-category attempt budgets with soft and hard limits.
//!
//! The ledger counts attempts per [`Category`] plus one global counter for
//! the whole run. Past a category's soft limit, continued retries need a
//! worthiness check; past a hard limit they are unconditionally denied.
//! Recording an attempt that would cross a hard limit is an invariant
//! violation, never a silent no-op.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::config::BudgetConfig;
use super::round::{Category, Severity};
use crate::domain::errors::{DomainError, DomainResult};

/// Attempt counter for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBudget {
    pub attempts: u32,
    pub soft_limit: u32,
    pub hard_limit: u32,
}

impl CategoryBudget {
    pub const fn new(soft_limit: u32, hard_limit: u32) -> Self {
        Self {
            attempts: 0,
            soft_limit,
            hard_limit,
        }
    }

    pub const fn remaining(&self) -> u32 {
        self.hard_limit.saturating_sub(self.attempts)
    }
}

/// Attempt counter for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalBudget {
    pub attempts: u32,
    pub hard_limit: u32,
}

/// Answer to "may this category be retried?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum RetryVerdict {
    Allow,
    /// Past the soft limit but judged worth another pass.
    AllowWithReview,
    Deny { reason: String },
}

impl RetryVerdict {
    pub const fn is_allowed(&self) -> bool {
        !matches!(self, Self::Deny { .. })
    }

    /// Lower is more actionable.
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Allow => 0,
            Self::AllowWithReview => 1,
            Self::Deny { .. } => 2,
        }
    }
}

/// Decides whether a retry past the soft limit is still worth it.
///
/// Kept pluggable: the heuristic is qualitative (severity plus category), so
/// deployments substitute their own rule rather than tune hidden constants.
pub trait RetryWorthinessPolicy: Send + Sync {
    /// `severity` is the worst outstanding problem, `None` when there is none.
    fn is_worth_review(&self, category: Category, severity: Option<Severity>) -> bool;
}

/// Worth reviewing when the worst outstanding problem is at or below a
/// per-category severity ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityCeilingPolicy {
    ceilings: BTreeMap<Category, Severity>,
    default_ceiling: Severity,
}

impl SeverityCeilingPolicy {
    pub fn new(ceilings: BTreeMap<Category, Severity>) -> Self {
        Self {
            ceilings,
            default_ceiling: Severity::Medium,
        }
    }

    pub fn from_config(config: &BudgetConfig) -> Self {
        let ceilings = Category::ALL
            .iter()
            .map(|c| (*c, config.category(*c).review_max_severity))
            .collect();
        Self::new(ceilings)
    }
}

impl Default for SeverityCeilingPolicy {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl RetryWorthinessPolicy for SeverityCeilingPolicy {
    fn is_worth_review(&self, category: Category, severity: Option<Severity>) -> bool {
        let ceiling = self
            .ceilings
            .get(&category)
            .copied()
            .unwrap_or(self.default_ceiling);
        severity.unwrap_or(Severity::Low) <= ceiling
    }
}

/// Attempt ledger for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLedger {
    categories: BTreeMap<Category, CategoryBudget>,
    global: GlobalBudget,
}

impl BudgetLedger {
    pub fn new(limits: BTreeMap<Category, (u32, u32)>, global_hard_limit: u32) -> Self {
        let categories = limits
            .into_iter()
            .map(|(category, (soft, hard))| (category, CategoryBudget::new(soft, hard)))
            .collect();
        Self {
            categories,
            global: GlobalBudget {
                attempts: 0,
                hard_limit: global_hard_limit,
            },
        }
    }

    pub fn from_config(config: &BudgetConfig) -> Self {
        let limits = Category::ALL
            .iter()
            .map(|c| {
                let limits = config.category(*c);
                (*c, (limits.soft_limit, limits.hard_limit))
            })
            .collect();
        Self::new(limits, config.global_hard_limit)
    }

    pub fn category(&self, category: Category) -> CategoryBudget {
        self.categories
            .get(&category)
            .copied()
            .unwrap_or(CategoryBudget::new(0, 0))
    }

    pub const fn global(&self) -> GlobalBudget {
        self.global
    }

    pub fn attempts(&self, category: Category) -> u32 {
        self.category(category).attempts
    }

    pub const fn global_exhausted(&self) -> bool {
        self.global.attempts >= self.global.hard_limit
    }

    /// Count one attempt against `category` and the global counter.
    pub fn record_attempt(&mut self, category: Category) -> DomainResult<()> {
        if self.global_exhausted() {
            return Err(DomainError::InvariantViolation(format!(
                "global attempts would exceed hard limit {}",
                self.global.hard_limit
            )));
        }
        let budget = self.categories.get_mut(&category).ok_or_else(|| {
            DomainError::InvariantViolation(format!("no budget configured for {category}"))
        })?;
        if budget.attempts >= budget.hard_limit {
            return Err(DomainError::InvariantViolation(format!(
                "{category} attempts would exceed hard limit {}",
                budget.hard_limit
            )));
        }
        budget.attempts += 1;
        self.global.attempts += 1;
        Ok(())
    }

    /// Verdict for the global counter alone.
    pub fn global_verdict(&self) -> RetryVerdict {
        if self.global_exhausted() {
            RetryVerdict::Deny {
                reason: format!(
                    "global hard limit reached ({}/{} rounds)",
                    self.global.attempts, self.global.hard_limit
                ),
            }
        } else {
            RetryVerdict::Allow
        }
    }

    /// Whether `category` may be retried given its worst outstanding problem.
    ///
    /// A global denial always overrides a category-level allowance.
    pub fn can_retry(
        &self,
        category: Category,
        severity: Option<Severity>,
        policy: &dyn RetryWorthinessPolicy,
    ) -> RetryVerdict {
        let global = self.global_verdict();
        if !global.is_allowed() {
            return global;
        }

        let budget = self.category(category);
        if budget.attempts >= budget.hard_limit {
            return RetryVerdict::Deny {
                reason: format!(
                    "hard limit reached ({}/{} {category} attempts)",
                    budget.attempts, budget.hard_limit
                ),
            };
        }
        if budget.attempts >= budget.soft_limit {
            if policy.is_worth_review(category, severity) {
                return RetryVerdict::AllowWithReview;
            }
            return RetryVerdict::Deny {
                reason: format!(
                    "soft limit exceeded, low expected value ({}/{} {category} attempts, worst severity {})",
                    budget.attempts,
                    budget.soft_limit,
                    severity.map_or("none", |s| s.as_str())
                ),
            };
        }
        RetryVerdict::Allow
    }

    /// Zero the attempt counters of `categories`, keeping the global counter.
    pub fn reset_categories(&mut self, categories: &[Category]) {
        for category in categories {
            if let Some(budget) = self.categories.get_mut(category) {
                budget.attempts = 0;
            }
        }
    }

    /// Check `attempts <= hard_limit` everywhere.
    pub fn validate(&self) -> Result<(), String> {
        for (category, budget) in &self.categories {
            if budget.attempts > budget.hard_limit {
                return Err(format!(
                    "{category} attempts {} exceed hard limit {}",
                    budget.attempts, budget.hard_limit
                ));
            }
        }
        if self.global.attempts > self.global.hard_limit {
            return Err(format!(
                "global attempts {} exceed hard limit {}",
                self.global.attempts, self.global.hard_limit
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> BudgetLedger {
        BudgetLedger::from_config(&BudgetConfig::default())
    }

    fn exhaust(ledger: &mut BudgetLedger, category: Category, n: u32) {
        for _ in 0..n {
            ledger.record_attempt(category).unwrap();
        }
    }

    #[test]
    fn test_defaults() {
        let l = ledger();
        assert_eq!(l.category(Category::Design).soft_limit, 3);
        assert_eq!(l.category(Category::Design).hard_limit, 5);
        assert_eq!(l.category(Category::Generation).hard_limit, 30);
        assert_eq!(l.category(Category::Evaluation).soft_limit, 20);
        assert_eq!(l.global().hard_limit, 100);
    }

    #[test]
    fn test_allow_below_soft_limit() {
        let mut l = ledger();
        exhaust(&mut l, Category::Generation, 9);
        let policy = SeverityCeilingPolicy::default();
        assert_eq!(
            l.can_retry(Category::Generation, Some(Severity::Critical), &policy),
            RetryVerdict::Allow
        );
    }

    #[test]
    fn test_soft_limit_review() {
        let mut l = ledger();
        exhaust(&mut l, Category::Generation, 10);
        let policy = SeverityCeilingPolicy::default();
        assert_eq!(
            l.can_retry(Category::Generation, Some(Severity::Low), &policy),
            RetryVerdict::AllowWithReview
        );
        assert_eq!(
            l.can_retry(Category::Generation, Some(Severity::Medium), &policy),
            RetryVerdict::AllowWithReview
        );
        let verdict = l.can_retry(Category::Generation, Some(Severity::High), &policy);
        match verdict {
            RetryVerdict::Deny { reason } => assert!(reason.starts_with("soft limit exceeded")),
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[test]
    fn test_high_severity_design_past_soft_limit_denied() {
        let mut l = ledger();
        exhaust(&mut l, Category::Design, 3);
        let policy = SeverityCeilingPolicy::default();
        assert!(!l
            .can_retry(Category::Design, Some(Severity::High), &policy)
            .is_allowed());
    }

    #[test]
    fn test_hard_limit_denies_any_severity() {
        let mut l = ledger();
        exhaust(&mut l, Category::Generation, 30);
        let policy = SeverityCeilingPolicy::default();
        for severity in [None, Some(Severity::Low), Some(Severity::Critical)] {
            match l.can_retry(Category::Generation, severity, &policy) {
                RetryVerdict::Deny { reason } => assert!(reason.starts_with("hard limit reached")),
                other => panic!("expected deny, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_record_past_hard_limit_is_invariant_violation() {
        let mut l = ledger();
        exhaust(&mut l, Category::Design, 5);
        let err = l.record_attempt(Category::Design).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(l.attempts(Category::Design), 5);
    }

    #[test]
    fn test_global_deny_overrides_category_allow() {
        let mut limits = BTreeMap::new();
        limits.insert(Category::Generation, (10, 30));
        let mut l = BudgetLedger::new(limits, 2);
        exhaust(&mut l, Category::Generation, 2);
        let policy = SeverityCeilingPolicy::default();
        match l.can_retry(Category::Generation, None, &policy) {
            RetryVerdict::Deny { reason } => assert!(reason.starts_with("global hard limit")),
            other => panic!("expected deny, got {other:?}"),
        }
        assert!(l.record_attempt(Category::Generation).is_err());
    }

    #[test]
    fn test_reset_keeps_global_counter() {
        let mut l = ledger();
        exhaust(&mut l, Category::Generation, 4);
        exhaust(&mut l, Category::Design, 2);
        l.reset_categories(&Category::EXECUTION);
        assert_eq!(l.attempts(Category::Generation), 0);
        assert_eq!(l.attempts(Category::Design), 2);
        assert_eq!(l.global().attempts, 6);
        assert!(l.validate().is_ok());
    }

    #[test]
    fn test_custom_ceiling_policy() {
        let mut ceilings = BTreeMap::new();
        ceilings.insert(Category::Evaluation, Severity::High);
        ceilings.insert(Category::Design, Severity::Low);
        let policy = SeverityCeilingPolicy::new(ceilings);
        assert!(policy.is_worth_review(Category::Evaluation, Some(Severity::High)));
        assert!(!policy.is_worth_review(Category::Design, Some(Severity::Medium)));
        assert!(policy.is_worth_review(Category::Generation, None));
    }
}
