//! Run coordinator: the multi-phase state machine around the decision engine.
//!
//! ```text
//! DESIGNING ──gate──▶ AWAITING_DESIGN_APPROVAL ──approve──▶ EXECUTING ◀─┐
//!     ▲                    │ reject                          │ continue ─┘
//!     └────────────────────┘                                 │
//!     ▲                                                      ├─ success / converged /
//!     │ approve                                              │  oscillating / cost ──▶ DONE
//! AWAITING_REDESIGN_APPROVAL ◀── systemic / budget ──────────┤
//!     │ reject ──▶ DONE                                      │
//!     ▲                                                      │ redesign requested
//! AWAITING_ROOT_CAUSE_REVIEW ◀───────────────────────────────┘
//!       approve ──▶ DESIGNING, reject ──▶ EXECUTING
//! ```
//!
//! The coordinator is the only mutator of its [`RunContext`]. A checkpoint is
//! written after every round and on every transition, so a resumed run
//! re-enters the recorded state with its ledgers exactly as they were.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Category, Checkpoint, Config, Decision, ExhaustionCause, RetryVerdict, RoundResult,
    RunContext, RunState, Turn,
};
use crate::domain::ports::{
    ApprovalDecision, ApprovalRequest, ApprovalSignal, CheckpointStore, RoundExecutor,
    RoundRequest, Summarizer,
};
use crate::services::context_compactor::ContextCompactor;
use crate::services::decision_engine::DecisionEngine;
use crate::services::retry::RetryPolicy;

/// The external collaborators one run talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Runs design and execution rounds.
    pub executor: Arc<dyn RoundExecutor>,
    /// Answers human approval requests.
    pub approval: Arc<dyn ApprovalSignal>,
    pub summarizer: Arc<dyn Summarizer>,
    /// Where checkpoints are written after every transition.
    pub store: Arc<dyn CheckpointStore>,
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub final_state: RunState,
    /// The decision that ended the run. Kept when the run was cancelled later.
    pub decision: Option<Decision>,
    /// Human-readable stop reason.
    pub reason: String,
    /// Latest recorded quality score, if any round ran.
    pub final_quality: Option<f64>,
    pub rounds: u32,
    pub tokens_spent: u64,
    /// Whether the operator cancelled the run, including before a resume.
    pub cancelled: bool,
}

/// Out-of-band controls for a running coordinator.
#[derive(Debug, Clone)]
pub struct RunHandle {
    cancel: Arc<watch::Sender<bool>>,
    compaction: Arc<AtomicBool>,
}

impl RunHandle {
    /// Cancel the run. Takes effect at the next round boundary or
    /// immediately if the run is waiting for approval.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether [`RunHandle::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Force a compaction at the next round boundary.
    pub fn request_compaction(&self) {
        self.compaction.store(true, Ordering::SeqCst);
    }
}

enum RoundAttempt {
    Completed(RoundResult),
    Failed(Decision),
}

enum ApprovalWait {
    Decided(ApprovalDecision),
    Failed(Decision),
    Cancelled,
}

/// Drives one run through its states, consulting the [`DecisionEngine`]
/// after every execution round and pausing for human approval where the
/// state machine requires it.
pub struct RunCoordinator {
    run_id: Uuid,
    config: Config,
    engine: DecisionEngine,
    executor: Arc<dyn RoundExecutor>,
    approval: Arc<dyn ApprovalSignal>,
    store: Arc<dyn CheckpointStore>,
    compactor: ContextCompactor,
    retry: RetryPolicy,
    state: RunState,
    context: RunContext,
    last_decision: Option<Decision>,
    sequence: u64,
    cancelled: bool,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    compaction_requested: Arc<AtomicBool>,
}

impl RunCoordinator {
    /// Start a fresh run in `DESIGNING`.
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let context = RunContext::new(&config);
        Self::assemble(
            Uuid::new_v4(),
            config,
            collaborators,
            RunState::Designing,
            context,
            None,
            0,
        )
    }

    /// Re-enter a run from its latest checkpoint.
    pub async fn resume(
        config: Config,
        collaborators: Collaborators,
        run_id: Uuid,
    ) -> DomainResult<Self> {
        let checkpoint = collaborators
            .store
            .load_latest(run_id)
            .await?
            .ok_or(DomainError::RunNotFound(run_id))?;
        Self::from_checkpoint(config, collaborators, checkpoint)
    }

    /// Rebuild a coordinator from a snapshot. Fails closed on inconsistency.
    pub fn from_checkpoint(
        config: Config,
        collaborators: Collaborators,
        checkpoint: Checkpoint,
    ) -> DomainResult<Self> {
        checkpoint.validate()?;
        info!(
            run_id = %checkpoint.run_id,
            state = checkpoint.state.as_str(),
            round = checkpoint.round_index(),
            sequence = checkpoint.sequence,
            "Resuming run from checkpoint"
        );
        let mut coordinator = Self::assemble(
            checkpoint.run_id,
            config,
            collaborators,
            checkpoint.state,
            checkpoint.context,
            checkpoint.last_decision,
            checkpoint.sequence,
        );
        coordinator.cancelled = checkpoint.cancelled;
        coordinator.compactor = coordinator.compactor.with_log(checkpoint.context_log);
        Ok(coordinator)
    }

    fn assemble(
        run_id: Uuid,
        config: Config,
        collaborators: Collaborators,
        state: RunState,
        context: RunContext,
        last_decision: Option<Decision>,
        sequence: u64,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config.retry);
        let compactor = ContextCompactor::new(
            config.compaction.clone(),
            collaborators.summarizer,
            retry.clone(),
            state.agent_role(),
        );
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            run_id,
            engine: DecisionEngine::new(&config),
            config,
            executor: collaborators.executor,
            approval: collaborators.approval,
            store: collaborators.store,
            compactor,
            retry,
            state,
            context,
            last_decision,
            sequence,
            cancelled: false,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            compaction_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the decision engine, e.g. to plug in a custom worthiness policy.
    #[must_use]
    pub fn with_engine(mut self, engine: DecisionEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Seed the context log with the run's requirement.
    #[must_use]
    pub fn with_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.compactor.append(Turn::user(requirement));
        self
    }

    /// Identifier shared by every checkpoint of this run.
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Current state-machine position.
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Ledgers, quality history and problem history of the run.
    pub const fn context(&self) -> &RunContext {
        &self.context
    }

    /// The compactor owning the run's context log.
    pub const fn compactor(&self) -> &ContextCompactor {
        &self.compactor
    }

    /// A cloneable handle for cancelling the run or forcing compaction from
    /// another task.
    pub fn handle(&self) -> RunHandle {
        RunHandle {
            cancel: Arc::clone(&self.cancel_tx),
            compaction: Arc::clone(&self.compaction_requested),
        }
    }

    /// Force a compaction at the next round boundary.
    pub fn request_compaction(&mut self) {
        self.compaction_requested.store(true, Ordering::SeqCst);
    }

    /// Drive the run until it reaches `DONE`.
    ///
    /// Only invariant violations and persistence errors escape as `Err`;
    /// collaborator failures become stop decisions.
    pub async fn run(&mut self) -> DomainResult<RunOutcome> {
        if self.sequence == 0 {
            self.checkpoint().await?;
        }

        loop {
            if self.state.is_terminal() {
                break;
            }
            if self.is_cancelled() {
                self.cancel_run().await?;
                continue;
            }
            match self.state {
                RunState::Designing => self.design_round().await?,
                RunState::AwaitingDesignApproval => self.await_design_approval().await?,
                RunState::Executing => self.execution_round().await?,
                RunState::AwaitingRootCauseReview => self.await_root_cause_review().await?,
                RunState::AwaitingRedesignApproval => self.await_redesign_approval().await?,
                RunState::Done => {}
            }
        }

        let outcome = self.outcome();
        info!(
            run_id = %outcome.run_id,
            decision = outcome.decision.as_ref().map_or("none", Decision::as_str),
            reason = %outcome.reason,
            rounds = outcome.rounds,
            final_quality = ?outcome.final_quality,
            "Run finished"
        );
        Ok(outcome)
    }

    /// Snapshot of the run's result so far. Final once the state is `DONE`.
    pub fn outcome(&self) -> RunOutcome {
        let reason = if self.cancelled {
            "cancelled by operator".to_string()
        } else {
            self.last_decision
                .as_ref()
                .map_or_else(|| format!("run is {}", self.state), Decision::reason)
        };
        RunOutcome {
            run_id: self.run_id,
            final_state: self.state,
            decision: self.last_decision.clone(),
            reason,
            final_quality: self.context.history.latest(),
            rounds: self.context.round_index,
            tokens_spent: self.context.tokens_spent,
            cancelled: self.cancelled,
        }
    }

    // -----------------------------------------------------------------------
    // Working states
    // -----------------------------------------------------------------------

    #[instrument(skip(self), fields(run_id = %self.run_id, round = self.context.round_index + 1))]
    async fn design_round(&mut self) -> DomainResult<()> {
        if let RetryVerdict::Deny { reason } =
            self.engine.retry_verdict(&self.context, Category::Design)
        {
            let decision = self.budget_denial(Category::Design, &reason);
            return self.transition(RunState::Done, Some(decision)).await;
        }
        if let Some(decision) = self.compact_at_boundary().await? {
            return self.transition(RunState::Done, Some(decision)).await;
        }

        match self.perform_round(Category::Design).await? {
            RoundAttempt::Failed(decision) => self.transition(RunState::Done, Some(decision)).await,
            RoundAttempt::Completed(_) => {
                let missing = self
                    .context
                    .missing_artifacts(&self.config.design.required_artifacts);
                if missing.is_empty() {
                    self.transition(RunState::AwaitingDesignApproval, None).await
                } else {
                    info!(missing = ?missing, "Design artifact set incomplete");
                    self.checkpoint().await
                }
            }
        }
    }

    #[instrument(skip(self), fields(run_id = %self.run_id, round = self.context.round_index + 1))]
    async fn execution_round(&mut self) -> DomainResult<()> {
        let category = self.context.next_category;
        if let RetryVerdict::Deny { reason } = self.engine.retry_verdict(&self.context, category) {
            let decision = self.budget_denial(category, &reason);
            return self.apply_decision(decision).await;
        }
        if let Some(decision) = self.compact_at_boundary().await? {
            return self.apply_decision(decision).await;
        }

        match self.perform_round(category).await? {
            RoundAttempt::Failed(decision) => self.apply_decision(decision).await,
            RoundAttempt::Completed(_) => {
                let decision = self.engine.decide(&self.context);
                self.apply_decision(decision).await
            }
        }
    }

    fn budget_denial(&self, category: Category, reason: &str) -> Decision {
        let cause = if self.context.ledger.global_exhausted() {
            ExhaustionCause::GlobalHardLimit
        } else {
            ExhaustionCause::CategoryLimits
        };
        Decision::StopBudgetExhausted {
            cause,
            reason: format!("budget exhausted: {category}: {reason}"),
        }
    }

    /// Map an execution-time decision onto the next state.
    async fn apply_decision(&mut self, decision: Decision) -> DomainResult<()> {
        info!(
            decision = decision.as_str(),
            reason = %decision.reason(),
            code = decision.reason_code(),
            "Decision"
        );
        match &decision {
            Decision::Continue { category, .. } => {
                self.context.next_category = *category;
                if let Some(request) = &self.context.redesign_request {
                    info!(trigger = %request.trigger_reason, "Round requested a redesign");
                    self.transition(RunState::AwaitingRootCauseReview, Some(decision))
                        .await
                } else {
                    self.transition(RunState::Executing, Some(decision)).await
                }
            }
            d if d.escalates_to_redesign() => {
                self.transition(RunState::AwaitingRedesignApproval, Some(decision))
                    .await
            }
            _ => self.transition(RunState::Done, Some(decision)).await,
        }
    }

    /// Run one round through the executor and fold it into the ledgers.
    async fn perform_round(&mut self, category: Category) -> DomainResult<RoundAttempt> {
        let request = RoundRequest {
            run_id: self.run_id,
            round_index: self.context.round_index + 1,
            category,
            context: self.compactor.log().clone(),
        };
        let executor = &self.executor;
        let attempt = self
            .retry
            .execute(|| {
                let request = request.clone();
                async move {
                    let result = executor.execute(request).await?;
                    if result.category != category {
                        return Err(DomainError::collaborator(
                            "round executor",
                            format!("returned a {} round for a {category} request", result.category),
                        ));
                    }
                    result
                        .validate()
                        .map_err(|message| DomainError::collaborator("round executor", message))?;
                    Ok(result)
                }
            })
            .await;

        let result = match attempt {
            Ok(result) => result,
            Err(DomainError::CollaboratorFailure {
                collaborator,
                message,
            }) => {
                warn!(%collaborator, %message, "Round abandoned after retries");
                return Ok(RoundAttempt::Failed(Decision::collaborator_failure(
                    &collaborator,
                    &message,
                )));
            }
            Err(err) => return Err(err),
        };

        let round = self.context.record_round(&result)?;
        self.compactor.extend(result.turns.iter().cloned());
        info!(
            round,
            category = category.as_str(),
            quality = result.quality,
            problems = result.problems.len(),
            tokens = result.tokens_spent,
            "Round recorded"
        );
        Ok(RoundAttempt::Completed(result))
    }

    /// Compact between rounds. Returns a stop decision if the summarizer
    /// kept failing.
    async fn compact_at_boundary(&mut self) -> DomainResult<Option<Decision>> {
        if self.compaction_requested.swap(false, Ordering::SeqCst) {
            self.compactor.request_compaction();
        }
        match self.compactor.maybe_compact().await {
            Ok(Some(_)) => {
                self.checkpoint().await?;
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(DomainError::CollaboratorFailure {
                collaborator,
                message,
            }) => Ok(Some(Decision::collaborator_failure(&collaborator, &message))),
            Err(err) => Err(err),
        }
    }

    // -----------------------------------------------------------------------
    // Waiting states
    // -----------------------------------------------------------------------

    #[instrument(skip(self), fields(run_id = %self.run_id))]
    async fn await_design_approval(&mut self) -> DomainResult<()> {
        let artifacts: Vec<String> = self
            .context
            .artifacts
            .iter()
            .map(|(name, location)| format!("{name}={location}"))
            .collect();
        let summary = format!(
            "Design complete after {} rounds; artifacts: {}",
            self.context.round_index,
            artifacts.join(", ")
        );
        match self.wait_for_approval(summary).await? {
            ApprovalWait::Cancelled => self.cancel_run().await,
            ApprovalWait::Failed(decision) => self.transition(RunState::Done, Some(decision)).await,
            ApprovalWait::Decided(ApprovalDecision::Approve) => {
                self.context.begin_execution();
                self.transition(RunState::Executing, None).await
            }
            ApprovalWait::Decided(ApprovalDecision::Reject { feedback }) => {
                self.record_feedback(feedback);
                self.context.artifacts.clear();
                self.transition(RunState::Designing, None).await
            }
        }
    }

    #[instrument(skip(self), fields(run_id = %self.run_id))]
    async fn await_root_cause_review(&mut self) -> DomainResult<()> {
        let summary = self.context.redesign_request.as_ref().map_or_else(
            || "Execution asked to revisit the design".to_string(),
            |request| {
                let mut text = format!("Execution asked for a redesign: {}", request.trigger_reason);
                if !request.suggestions.is_empty() {
                    text.push_str("; suggestions: ");
                    text.push_str(&request.suggestions.join("; "));
                }
                text
            },
        );
        match self.wait_for_approval(summary).await? {
            ApprovalWait::Cancelled => self.cancel_run().await,
            ApprovalWait::Failed(decision) => self.transition(RunState::Done, Some(decision)).await,
            ApprovalWait::Decided(ApprovalDecision::Approve) => {
                self.context.begin_redesign();
                self.transition(RunState::Designing, None).await
            }
            ApprovalWait::Decided(ApprovalDecision::Reject { feedback }) => {
                self.record_feedback(feedback);
                self.context.redesign_request = None;
                self.transition(RunState::Executing, None).await
            }
        }
    }

    #[instrument(skip(self), fields(run_id = %self.run_id))]
    async fn await_redesign_approval(&mut self) -> DomainResult<()> {
        let summary = format!(
            "Execution stopped: {}. Approve a redesign or accept quality {}",
            self.last_decision
                .as_ref()
                .map_or_else(|| "no decision recorded".to_string(), Decision::reason),
            self.context
                .history
                .latest()
                .map_or_else(|| "n/a".to_string(), |q| format!("{q:.3}"))
        );
        match self.wait_for_approval(summary).await? {
            ApprovalWait::Cancelled => self.cancel_run().await,
            ApprovalWait::Failed(decision) => self.transition(RunState::Done, Some(decision)).await,
            ApprovalWait::Decided(ApprovalDecision::Approve) => {
                self.context.begin_redesign();
                self.transition(RunState::Designing, None).await
            }
            ApprovalWait::Decided(ApprovalDecision::Reject { feedback }) => {
                self.record_feedback(feedback);
                self.transition(RunState::Done, None).await
            }
        }
    }

    /// Block on the approval signal, racing it against cancellation.
    async fn wait_for_approval(&mut self, summary: String) -> DomainResult<ApprovalWait> {
        if self.is_cancelled() {
            return Ok(ApprovalWait::Cancelled);
        }
        let request = ApprovalRequest {
            run_id: self.run_id,
            state: self.state,
            summary,
        };
        info!(state = self.state.as_str(), summary = %request.summary, "Waiting for approval");

        let approval = &self.approval;
        let retry = &self.retry;
        let mut cancel = self.cancel_rx.clone();
        let result = tokio::select! {
            result = retry.execute(|| approval.request(request.clone())) => result,
            () = cancelled(&mut cancel) => return Ok(ApprovalWait::Cancelled),
        };

        match result {
            Ok(decision) => {
                info!(approved = decision.is_approved(), "Approval received");
                Ok(ApprovalWait::Decided(decision))
            }
            Err(DomainError::CollaboratorFailure {
                collaborator,
                message,
            }) => Ok(ApprovalWait::Failed(Decision::collaborator_failure(
                &collaborator,
                &message,
            ))),
            Err(err) => Err(err),
        }
    }

    fn record_feedback(&mut self, feedback: Option<String>) {
        if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
            self.compactor.append(Turn::user(format!(
                "Reviewer feedback at {}: {feedback}",
                self.state
            )));
        }
    }

    // -----------------------------------------------------------------------
    // Transitions and persistence
    // -----------------------------------------------------------------------

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    async fn cancel_run(&mut self) -> DomainResult<()> {
        warn!(
            state = self.state.as_str(),
            last_quality = ?self.context.history.latest(),
            "Run cancelled"
        );
        self.cancelled = true;
        self.transition(RunState::Done, None).await
    }

    async fn transition(&mut self, next: RunState, decision: Option<Decision>) -> DomainResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
                reason: decision.map_or_else(|| "no decision".to_string(), |d| d.reason()),
            });
        }
        info!(from = self.state.as_str(), to = next.as_str(), "State transition");
        self.state = next;
        if decision.is_some() {
            self.last_decision = decision;
        }
        self.compactor.set_role(next.agent_role());
        self.checkpoint().await
    }

    async fn checkpoint(&mut self) -> DomainResult<()> {
        self.sequence += 1;
        let mut checkpoint = Checkpoint::new(
            self.run_id,
            self.sequence,
            self.state,
            self.context.clone(),
            self.compactor.log().clone(),
            self.last_decision.clone(),
        );
        checkpoint.cancelled = self.cancelled;
        self.store.save(&checkpoint).await?;
        tracing::debug!(
            checkpoint_id = %checkpoint.checkpoint_id,
            sequence = checkpoint.sequence,
            state = checkpoint.state.as_str(),
            round = checkpoint.round_index(),
            "Checkpoint saved"
        );
        Ok(())
    }
}

/// Resolves once the cancel flag is set. Never resolves if the sender is gone.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
