//! Decision engine: one action per round from four independent signals.
//!
//! The checks form a strict priority chain. Each is a total veto over the
//! ones after it:
//!
//! 1. global hard limit      -> `StopBudgetExhausted`
//! 2. quality target met     -> `StopSuccess`
//! 3. converged              -> `StopConverged`
//! 4. oscillating            -> `StopOscillating`
//! 5. systemic defect        -> `StopSystemic`
//! 6. every candidate denied -> `StopBudgetExhausted`
//! 7. none worth its cost    -> `StopCostIneffective`
//! 8. otherwise              -> `Continue(best candidate)`
//!
//! The engine never mutates anything; it reads a [`RunContext`].

use std::sync::Arc;

use crate::domain::models::{
    Category, Config, CostAssessment, Decision, ExhaustionCause, ProblemClassifier, QualityConfig,
    RetryVerdict, RetryWorthinessPolicy, RunContext, Severity, SeverityCeilingPolicy,
};

/// A retry target with the signals used to rank it.
#[derive(Debug, Clone)]
struct Candidate {
    category: Category,
    severity: Option<Severity>,
    verdict: RetryVerdict,
    cost: CostAssessment,
}

impl Candidate {
    fn is_viable(&self) -> bool {
        self.verdict.is_allowed() && self.cost.worth_continuing
    }
}

/// Pure stop/continue policy evaluated after every execution round.
#[derive(Clone)]
pub struct DecisionEngine {
    quality: QualityConfig,
    classifier: ProblemClassifier,
    policy: Arc<dyn RetryWorthinessPolicy>,
    token_budget: u64,
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("quality", &self.quality)
            .field("classifier", &self.classifier)
            .field("token_budget", &self.token_budget)
            .finish_non_exhaustive()
    }
}

impl DecisionEngine {
    /// Engine with the severity-ceiling worthiness policy from `config`.
    pub fn new(config: &Config) -> Self {
        Self::with_policy(config, Arc::new(SeverityCeilingPolicy::from_config(&config.budget)))
    }

    /// Use a custom soft-limit worthiness policy.
    pub fn with_policy(config: &Config, policy: Arc<dyn RetryWorthinessPolicy>) -> Self {
        Self {
            quality: config.quality.clone(),
            classifier: ProblemClassifier::new(config.problems.clone()),
            policy,
            token_budget: config.budget.token_budget,
        }
    }

    /// Budget verdict for retrying `category` given its outstanding problems.
    pub fn retry_verdict(&self, ctx: &RunContext, category: Category) -> RetryVerdict {
        ctx.ledger
            .can_retry(category, ctx.outstanding_severity(category), self.policy.as_ref())
    }

    /// Next step for the run. Stop conditions are checked in priority order
    /// (global limit, target, convergence, oscillation, systemic problems)
    /// before a retry target is picked.
    pub fn decide(&self, ctx: &RunContext) -> Decision {
        if let RetryVerdict::Deny { reason } = ctx.ledger.global_verdict() {
            return Decision::StopBudgetExhausted {
                cause: ExhaustionCause::GlobalHardLimit,
                reason: format!("budget exhausted: {reason}"),
            };
        }

        let target = self.quality.quality_target;
        if ctx.history.target_met(target) {
            let quality = ctx.history.latest().unwrap_or(target);
            return Decision::StopSuccess {
                reason: format!("target met: quality {quality:.3} >= target {target:.3}"),
            };
        }

        let (converged, reason) = ctx.history.should_stop_for_convergence(&self.quality);
        if converged {
            return Decision::StopConverged { reason };
        }

        if ctx.history.is_oscillating(&self.quality) {
            let window = self.quality.convergence_window;
            return Decision::StopOscillating {
                reason: format!(
                    "oscillating: quality changed direction {} times over last {window} rounds",
                    ctx.history.sign_flips(window)
                ),
            };
        }

        let classification = self.classifier.classify(ctx.latest_problems(), &ctx.registry);
        if classification.early_stop {
            return Decision::StopSystemic {
                reason: classification.reason,
            };
        }

        self.choose_category(ctx)
    }

    fn candidates(&self, ctx: &RunContext) -> Vec<Candidate> {
        let mut categories = ctx.categories_with_problems();
        if categories.is_empty() {
            categories.push(ctx.last_category.unwrap_or(ctx.next_category));
        }

        let current_quality = ctx.history.latest().unwrap_or(0.0);
        let remaining = ctx.remaining_token_budget(self.token_budget) as f64;
        categories
            .into_iter()
            .map(|category| Candidate {
                category,
                severity: ctx.outstanding_severity(category),
                verdict: self.retry_verdict(ctx, category),
                cost: ctx
                    .cost
                    .worth_continuing(category, current_quality, remaining),
            })
            .collect()
    }

    fn choose_category(&self, ctx: &RunContext) -> Decision {
        let candidates = self.candidates(ctx);

        if candidates.iter().all(|c| !c.verdict.is_allowed()) {
            let reasons: Vec<String> = candidates
                .iter()
                .filter_map(|c| match &c.verdict {
                    RetryVerdict::Deny { reason } => Some(format!("{}: {reason}", c.category)),
                    _ => None,
                })
                .collect();
            return Decision::StopBudgetExhausted {
                cause: ExhaustionCause::CategoryLimits,
                reason: format!("budget exhausted: {}", reasons.join("; ")),
            };
        }

        if candidates.iter().all(|c| !c.cost.worth_continuing) {
            let details: Vec<String> = candidates
                .iter()
                .map(|c| {
                    format!(
                        "{}: {:.0} per point, projected {:.3}",
                        c.category, c.cost.cost_per_percent_point, c.cost.projected_quality
                    )
                })
                .collect();
            return Decision::StopCostIneffective {
                reason: format!("cost ineffective: {}", details.join("; ")),
            };
        }

        candidates
            .iter()
            .filter(|c| c.is_viable())
            .min_by_key(|c| (c.verdict.rank(), c.severity, c.category.fix_cost_rank()))
            .map_or_else(
                || Decision::StopCostIneffective {
                    reason: "cost ineffective: no category is both within budget and worth its cost"
                        .to_string(),
                },
                |best| Decision::Continue {
                    category: best.category,
                    review: best.verdict == RetryVerdict::AllowWithReview,
                },
            )
    }
}
