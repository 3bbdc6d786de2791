//! Common test utilities for integration tests
//!
//! Fixtures for driving a full run coordinator with scripted collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use synthloop::adapters::{
    ExtractiveSummarizer, InMemoryCheckpointStore, ScriptedApproval, ScriptedExecutor,
};
use synthloop::domain::models::{
    Category, Checkpoint, CheckpointSummary, Config, ProblemReport, RetryConfig, RoundResult,
    Severity,
};
use synthloop::domain::ports::{
    ApprovalDecision, ApprovalRequest, ApprovalSignal, CheckpointStore,
};
use synthloop::{DomainError, DomainResult};
use synthloop::services::Collaborators;

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Default configuration with instant retries.
pub fn fast_config() -> Config {
    Config {
        retry: RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        },
        ..Config::default()
    }
}

/// A design round that passes the artifact gate.
pub fn complete_design(quality: f64) -> RoundResult {
    RoundResult::new(Category::Design, quality)
        .with_artifact("business_rules", "design/rules.md")
        .with_artifact("scenario_design", "design/scenarios.md")
}

pub fn generation(quality: f64) -> RoundResult {
    RoundResult::new(Category::Generation, quality).with_tokens(5_000)
}

pub fn problem(severity: Severity, key: &str) -> ProblemReport {
    ProblemReport::new(severity, key, 1)
}

pub fn collaborators(
    executor: Arc<ScriptedExecutor>,
    approval: Arc<dyn ApprovalSignal>,
    store: Arc<dyn CheckpointStore>,
) -> Collaborators {
    Collaborators {
        executor,
        approval,
        summarizer: Arc::new(ExtractiveSummarizer::default()),
        store,
    }
}

/// Scripted executor, auto-approval and a fresh in-memory store.
pub fn scripted(rounds: Vec<RoundResult>) -> (Collaborators, Arc<ScriptedExecutor>, Arc<InMemoryCheckpointStore>) {
    let executor = Arc::new(ScriptedExecutor::new(rounds));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let collaborators = collaborators(
        Arc::clone(&executor),
        Arc::new(ScriptedApproval::auto_approve()),
        store.clone(),
    );
    (collaborators, executor, store)
}

/// Approval signal that never answers.
pub struct PendingApproval;

#[async_trait]
impl ApprovalSignal for PendingApproval {
    async fn request(&self, _request: ApprovalRequest) -> DomainResult<ApprovalDecision> {
        std::future::pending().await
    }
}

/// Approves the first `approvals` requests, then never answers again.
pub struct ApproveThenPending {
    approvals_left: AtomicUsize,
}

impl ApproveThenPending {
    pub fn new(approvals: usize) -> Self {
        Self {
            approvals_left: AtomicUsize::new(approvals),
        }
    }
}

#[async_trait]
impl ApprovalSignal for ApproveThenPending {
    async fn request(&self, _request: ApprovalRequest) -> DomainResult<ApprovalDecision> {
        let left = self.approvals_left.load(Ordering::SeqCst);
        if left == 0 {
            return std::future::pending().await;
        }
        self.approvals_left.store(left - 1, Ordering::SeqCst);
        Ok(ApprovalDecision::Approve)
    }
}

/// Store that accepts a fixed number of saves and then fails like a crashed
/// process would. Everything saved before the failure stays in `inner`.
pub struct CrashingStore {
    pub inner: Arc<InMemoryCheckpointStore>,
    saves_left: AtomicUsize,
}

impl CrashingStore {
    pub fn new(inner: Arc<InMemoryCheckpointStore>, saves: usize) -> Self {
        Self {
            inner,
            saves_left: AtomicUsize::new(saves),
        }
    }
}

#[async_trait]
impl CheckpointStore for CrashingStore {
    async fn save(&self, checkpoint: &Checkpoint) -> DomainResult<()> {
        let left = self.saves_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(DomainError::DatabaseError("disk went away".to_string()));
        }
        self.saves_left.store(left - 1, Ordering::SeqCst);
        self.inner.save(checkpoint).await
    }

    async fn load_latest(&self, run_id: Uuid) -> DomainResult<Option<Checkpoint>> {
        self.inner.load_latest(run_id).await
    }

    async fn load(&self, checkpoint_id: Uuid) -> DomainResult<Option<Checkpoint>> {
        self.inner.load(checkpoint_id).await
    }

    async fn list(&self, limit: usize) -> DomainResult<Vec<CheckpointSummary>> {
        self.inner.list(limit).await
    }

    async fn latest_run(&self) -> DomainResult<Option<Uuid>> {
        self.inner.latest_run().await
    }

    async fn discard(&self, run_id: Uuid) -> DomainResult<u64> {
        self.inner.discard(run_id).await
    }
}
