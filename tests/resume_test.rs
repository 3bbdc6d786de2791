//! Crash recovery: a run interrupted by a failed checkpoint write resumes
//! from its last durable snapshot with its ledgers intact.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    collaborators, complete_design, fast_config, generation, problem, ApproveThenPending,
    CrashingStore,
};
use synthloop::adapters::{InMemoryCheckpointStore, ScriptedApproval, ScriptedExecutor};
use synthloop::domain::models::{Category, Decision, RunState, Severity, TurnRole};
use synthloop::domain::ports::CheckpointStore;
use synthloop::services::RunCoordinator;
use synthloop::DomainError;

const REQUIREMENT: &str = "Build evaluation samples for the refund flow";

#[tokio::test]
async fn test_resume_after_crash_continues_from_last_checkpoint() {
    common::setup_test_logging();
    let inner = Arc::new(InMemoryCheckpointStore::new());
    // Initial snapshot, design gate, approval and the first execution round
    // are persisted; the checkpoint after round 3 is lost.
    let crashing = Arc::new(CrashingStore::new(Arc::clone(&inner), 4));
    let first_executor = Arc::new(ScriptedExecutor::new(vec![
        complete_design(0.5),
        generation(0.6).with_problems(vec![problem(Severity::Medium, "thin-edge-cases")]),
        generation(0.65).with_problems(vec![problem(Severity::Medium, "thin-edge-cases")]),
    ]));
    let mut first = RunCoordinator::new(
        fast_config(),
        collaborators(
            first_executor,
            Arc::new(ScriptedApproval::auto_approve()),
            crashing,
        ),
    )
    .with_requirement(REQUIREMENT);
    let run_id = first.run_id();

    let err = first.run().await.unwrap_err();
    assert!(matches!(err, DomainError::DatabaseError(_)));

    let latest = inner.load_latest(run_id).await.unwrap().unwrap();
    assert_eq!(latest.sequence, 4);
    assert_eq!(latest.state, RunState::Executing);
    assert_eq!(latest.round_index(), 2);

    let executor = Arc::new(ScriptedExecutor::new(vec![generation(0.9)]));
    let mut resumed = RunCoordinator::resume(
        fast_config(),
        collaborators(
            executor.clone(),
            Arc::new(ScriptedApproval::auto_approve()),
            inner.clone(),
        ),
        run_id,
    )
    .await
    .unwrap();
    assert_eq!(resumed.state(), RunState::Executing);

    let outcome = resumed.run().await.unwrap();

    assert_eq!(outcome.run_id, run_id);
    assert!(matches!(outcome.decision, Some(Decision::StopSuccess { .. })));
    assert_eq!(outcome.rounds, 3);
    assert_eq!(executor.calls().await, vec![(3, Category::Generation)]);

    let ctx = resumed.context();
    assert_eq!(ctx.ledger.attempts(Category::Generation), 2);
    assert_eq!(ctx.ledger.global().attempts, 3);
    assert_eq!(ctx.registry.occurrences("thin-edge-cases"), 1);

    let first_turn = &resumed.compactor().log().turns()[0];
    assert_eq!(first_turn.role, TurnRole::User);
    assert_eq!(first_turn.payload, REQUIREMENT);
}

#[tokio::test]
async fn test_resume_while_awaiting_approval_asks_again() {
    let inner = Arc::new(InMemoryCheckpointStore::new());
    // Initial snapshot and the design gate are persisted.
    let crashing = Arc::new(CrashingStore::new(Arc::clone(&inner), 2));
    let mut first = RunCoordinator::new(
        fast_config(),
        collaborators(
            Arc::new(ScriptedExecutor::new(vec![complete_design(0.5)])),
            Arc::new(ScriptedApproval::auto_approve()),
            crashing,
        ),
    );
    let run_id = first.run_id();
    assert!(first.run().await.is_err());

    let approval = Arc::new(ScriptedApproval::auto_approve());
    let executor = Arc::new(ScriptedExecutor::new(vec![generation(0.95)]));
    let mut resumed = RunCoordinator::resume(
        fast_config(),
        collaborators(executor.clone(), approval.clone(), inner),
        run_id,
    )
    .await
    .unwrap();
    assert_eq!(resumed.state(), RunState::AwaitingDesignApproval);

    let outcome = resumed.run().await.unwrap();

    assert!(matches!(outcome.decision, Some(Decision::StopSuccess { .. })));
    assert_eq!(outcome.rounds, 2);
    let requests = approval.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].state, RunState::AwaitingDesignApproval);
    assert_eq!(executor.calls().await, vec![(2, Category::Generation)]);
}

#[tokio::test]
async fn test_cancelled_run_stays_cancelled_after_resume() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    // Design is approved; the run then stops on a systemic defect and waits
    // for a redesign approval that never comes.
    let mut first = RunCoordinator::new(
        fast_config(),
        collaborators(
            Arc::new(ScriptedExecutor::new(vec![
                complete_design(0.5),
                generation(0.4).with_problems(vec![
                    problem(Severity::Critical, "wrong-currency"),
                    problem(Severity::Medium, "thin-edge-cases"),
                ]),
            ])),
            Arc::new(ApproveThenPending::new(1)),
            store.clone(),
        ),
    );
    let run_id = first.run_id();
    let handle = first.handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });
    let live = tokio::time::timeout(Duration::from_secs(5), first.run())
        .await
        .expect("cancellation should interrupt the approval wait")
        .unwrap();
    assert!(live.cancelled);
    assert_eq!(live.reason, "cancelled by operator");
    assert!(matches!(live.decision, Some(Decision::StopSystemic { .. })));

    let latest = store.load_latest(run_id).await.unwrap().unwrap();
    assert_eq!(latest.state, RunState::Done);
    assert!(latest.cancelled);

    let executor = Arc::new(ScriptedExecutor::new(vec![]));
    let mut resumed = RunCoordinator::resume(
        fast_config(),
        collaborators(
            executor.clone(),
            Arc::new(ScriptedApproval::auto_approve()),
            store,
        ),
        run_id,
    )
    .await
    .unwrap();
    assert_eq!(resumed.outcome(), live);

    let outcome = resumed.run().await.unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.reason, "cancelled by operator");
    assert_eq!(outcome.final_state, RunState::Done);
    assert_eq!(outcome, live);
    assert!(executor.calls().await.is_empty());
}

#[tokio::test]
async fn test_corrupt_checkpoint_fails_closed() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let (collab, _executor, _store) = common::scripted(vec![]);
    let collab = synthloop::services::Collaborators {
        store: store.clone(),
        ..collab
    };

    let mut ctx = synthloop::domain::models::RunContext::new(&fast_config());
    ctx.round_index = 3;
    let checkpoint = synthloop::domain::models::Checkpoint::new(
        uuid::Uuid::new_v4(),
        1,
        RunState::Executing,
        ctx,
        synthloop::domain::models::ContextLog::new(),
        None,
    );
    store.save(&checkpoint).await.unwrap();

    let result = RunCoordinator::resume(fast_config(), collab, checkpoint.run_id).await;
    assert!(matches!(result, Err(DomainError::CorruptCheckpoint { .. })));
}
