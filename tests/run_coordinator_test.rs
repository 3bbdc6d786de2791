//! End-to-end runs of the coordinator with scripted collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    collaborators, complete_design, fast_config, generation, problem, scripted, PendingApproval,
};
use synthloop::adapters::{InMemoryCheckpointStore, ScriptedApproval, ScriptedExecutor};
use synthloop::domain::models::{
    Category, CostProfile, Decision, RedesignRequest, RoundResult, RunState, Severity, Turn,
    TurnRole,
};
use synthloop::domain::ports::{ApprovalDecision, CheckpointStore};
use synthloop::services::RunCoordinator;

fn reject(feedback: Option<&str>) -> ApprovalDecision {
    ApprovalDecision::Reject {
        feedback: feedback.map(ToString::to_string),
    }
}

#[tokio::test]
async fn test_happy_path_reaches_target() {
    common::setup_test_logging();
    let (collab, executor, store) = scripted(vec![
        complete_design(0.5),
        generation(0.6).with_problems(vec![problem(Severity::Medium, "thin-edge-cases")]),
        generation(0.9),
    ]);
    let mut coordinator =
        RunCoordinator::new(fast_config(), collab).with_requirement("Build refund samples");

    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.final_state, RunState::Done);
    assert!(matches!(outcome.decision, Some(Decision::StopSuccess { .. })));
    assert!(outcome.reason.starts_with("target met"));
    assert_eq!(outcome.rounds, 3);
    assert_eq!(outcome.final_quality, Some(0.9));
    assert_eq!(outcome.tokens_spent, 10_000);
    assert!(!outcome.cancelled);
    assert_eq!(
        executor.calls().await,
        vec![
            (1, Category::Design),
            (2, Category::Generation),
            (3, Category::Generation)
        ]
    );

    let latest = store.load_latest(outcome.run_id).await.unwrap().unwrap();
    assert_eq!(latest.state, RunState::Done);
    assert_eq!(latest.round_index(), 3);
    assert_eq!(latest.context.ledger.attempts(Category::Generation), 2);
    assert_eq!(latest.context.ledger.global().attempts, 3);
}

#[tokio::test]
async fn test_incomplete_design_keeps_designing() {
    let (collab, executor, _store) = scripted(vec![
        RoundResult::new(Category::Design, 0.3).with_artifact("business_rules", "rules.md"),
        complete_design(0.5),
        generation(0.95),
    ]);
    let outcome = RunCoordinator::new(fast_config(), collab)
        .run()
        .await
        .unwrap();

    assert!(matches!(outcome.decision, Some(Decision::StopSuccess { .. })));
    assert_eq!(
        executor.calls().await,
        vec![
            (1, Category::Design),
            (2, Category::Design),
            (3, Category::Generation)
        ]
    );
}

#[tokio::test]
async fn test_design_rejection_feeds_back_and_redesigns() {
    let executor = Arc::new(ScriptedExecutor::new(vec![
        complete_design(0.5),
        complete_design(0.7),
        generation(0.9),
    ]));
    let approval = Arc::new(ScriptedApproval::new(vec![
        reject(Some("add partial refunds")),
        ApprovalDecision::Approve,
    ]));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let mut coordinator = RunCoordinator::new(
        fast_config(),
        collaborators(executor.clone(), approval.clone(), store),
    );

    let outcome = coordinator.run().await.unwrap();

    assert!(matches!(outcome.decision, Some(Decision::StopSuccess { .. })));
    assert_eq!(outcome.rounds, 3);
    let requests = approval.requests().await;
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| r.state == RunState::AwaitingDesignApproval));
    assert!(coordinator
        .compactor()
        .log()
        .turns()
        .iter()
        .any(|t| t.role == TurnRole::User && t.payload.contains("add partial refunds")));
    assert_eq!(coordinator.context().ledger.attempts(Category::Design), 2);
}

#[tokio::test]
async fn test_systemic_defect_escalates_to_redesign() {
    let (collab, _executor, _store) = scripted(vec![
        complete_design(0.5),
        generation(0.4).with_problems(vec![
            problem(Severity::Critical, "wrong-currency"),
            problem(Severity::Critical, "missing-policy"),
        ]),
        generation(0.9),
    ]);
    let mut coordinator = RunCoordinator::new(fast_config(), collab);

    let outcome = coordinator.run().await.unwrap();

    assert!(matches!(outcome.decision, Some(Decision::StopSuccess { .. })));
    assert_eq!(outcome.rounds, 4);
    let ctx = coordinator.context();
    // Execution budgets were reset by the redesign; the global counter was not.
    assert_eq!(ctx.ledger.attempts(Category::Generation), 1);
    assert_eq!(ctx.ledger.attempts(Category::Design), 2);
    assert_eq!(ctx.ledger.global().attempts, 4);
    assert_eq!(ctx.history.len(), 4);
    assert_eq!(ctx.history.window(5), &[0.9]);
}

#[tokio::test]
async fn test_rejected_redesign_ends_run() {
    let executor = Arc::new(ScriptedExecutor::new(vec![
        complete_design(0.5),
        generation(0.4).with_problems(vec![problem(Severity::Critical, "wrong-currency")]),
    ]));
    let approval = Arc::new(ScriptedApproval::new(vec![
        ApprovalDecision::Approve,
        reject(None),
    ]));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let outcome = RunCoordinator::new(fast_config(), collaborators(executor, approval.clone(), store))
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.final_state, RunState::Done);
    assert!(matches!(outcome.decision, Some(Decision::StopSystemic { .. })));
    assert!(outcome.reason.starts_with("systemic defect"));
    assert_eq!(outcome.rounds, 2);
    assert_eq!(
        approval.requests().await.last().map(|r| r.state),
        Some(RunState::AwaitingRedesignApproval)
    );
}

#[tokio::test]
async fn test_root_cause_review_rejected_continues_execution() {
    let executor = Arc::new(ScriptedExecutor::new(vec![
        complete_design(0.5),
        generation(0.6)
            .with_problems(vec![problem(Severity::Medium, "ambiguous-rule")])
            .with_redesign_request(RedesignRequest {
                trigger_reason: "refund window rule is ambiguous".to_string(),
                suggestions: vec!["state the window in days".to_string()],
            }),
        generation(0.9),
    ]));
    let approval = Arc::new(ScriptedApproval::new(vec![
        ApprovalDecision::Approve,
        reject(Some("keep going")),
    ]));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let mut coordinator = RunCoordinator::new(
        fast_config(),
        collaborators(executor.clone(), approval.clone(), store),
    );

    let outcome = coordinator.run().await.unwrap();

    assert!(matches!(outcome.decision, Some(Decision::StopSuccess { .. })));
    assert_eq!(outcome.rounds, 3);
    let requests = approval.requests().await;
    assert_eq!(requests[1].state, RunState::AwaitingRootCauseReview);
    assert!(requests[1].summary.contains("refund window rule is ambiguous"));
    assert!(coordinator.context().redesign_request.is_none());
    assert_eq!(coordinator.context().ledger.attempts(Category::Generation), 2);
}

#[tokio::test]
async fn test_root_cause_review_approved_returns_to_design() {
    let executor = Arc::new(ScriptedExecutor::new(vec![
        complete_design(0.5),
        generation(0.6).with_redesign_request(RedesignRequest {
            trigger_reason: "scenarios miss chargebacks".to_string(),
            suggestions: vec![],
        }),
        generation(0.9),
    ]));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let mut coordinator = RunCoordinator::new(
        fast_config(),
        collaborators(
            executor.clone(),
            Arc::new(ScriptedApproval::auto_approve()),
            store,
        ),
    );

    let outcome = coordinator.run().await.unwrap();

    assert!(matches!(outcome.decision, Some(Decision::StopSuccess { .. })));
    assert_eq!(
        executor.calls().await,
        vec![
            (1, Category::Design),
            (2, Category::Generation),
            (3, Category::Design),
            (4, Category::Generation)
        ]
    );
    assert_eq!(coordinator.context().ledger.attempts(Category::Generation), 1);
}

#[tokio::test]
async fn test_global_hard_limit_stops_run() {
    let mut config = fast_config();
    config.budget.global_hard_limit = 3;
    let (collab, _executor, _store) = scripted(vec![
        complete_design(0.5),
        generation(0.5).with_problems(vec![problem(Severity::Medium, "dup-samples")]),
    ]);
    let mut coordinator = RunCoordinator::new(config, collab);

    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.final_state, RunState::Done);
    assert_eq!(outcome.rounds, 3);
    let decision = outcome.decision.unwrap();
    assert_eq!(decision.reason_code(), "global_hard_limit");
    assert!(decision.reason().starts_with("budget exhausted"));
    assert_eq!(coordinator.context().ledger.global().attempts, 3);
}

#[tokio::test]
async fn test_plateau_converges() {
    let (collab, _executor, _store) = scripted(vec![
        complete_design(0.5),
        generation(0.6).with_problems(vec![problem(Severity::Medium, "flat")]),
    ]);
    let outcome = RunCoordinator::new(fast_config(), collab)
        .run()
        .await
        .unwrap();

    assert!(matches!(outcome.decision, Some(Decision::StopConverged { .. })));
    assert!(outcome.reason.starts_with("converged"));
    // One design round plus a full window of five execution rounds.
    assert_eq!(outcome.rounds, 6);
}

#[tokio::test]
async fn test_alternating_scores_oscillate() {
    let rounds = [0.5, 0.6, 0.5, 0.6, 0.5]
        .into_iter()
        .map(|q| generation(q).with_problems(vec![problem(Severity::Medium, "flaky")]));
    let (collab, _executor, _store) =
        scripted(std::iter::once(complete_design(0.4)).chain(rounds).collect());

    let outcome = RunCoordinator::new(fast_config(), collab)
        .run()
        .await
        .unwrap();

    assert!(matches!(outcome.decision, Some(Decision::StopOscillating { .. })));
    assert_eq!(outcome.rounds, 6);
}

#[tokio::test]
async fn test_expensive_low_quality_round_is_cost_ineffective() {
    let mut config = fast_config();
    config.cost.generation = CostProfile::new(100_000.0, 0.01);
    let (collab, _executor, _store) = scripted(vec![
        complete_design(0.5),
        generation(0.4).with_problems(vec![problem(Severity::Medium, "weak-samples")]),
    ]);

    let outcome = RunCoordinator::new(config, collab).run().await.unwrap();

    assert!(matches!(
        outcome.decision,
        Some(Decision::StopCostIneffective { .. })
    ));
    assert_eq!(outcome.final_state, RunState::Done);
    assert_eq!(outcome.rounds, 2);
}

#[tokio::test]
async fn test_executor_failure_during_execution_is_collaborator_failure() {
    // No generation rounds scripted: every generation call fails.
    let executor = Arc::new(ScriptedExecutor::new(vec![complete_design(0.5)]));
    let approval = Arc::new(ScriptedApproval::new(vec![
        ApprovalDecision::Approve,
        reject(None),
    ]));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let outcome = RunCoordinator::new(
        fast_config(),
        collaborators(executor.clone(), approval.clone(), store),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(outcome.final_state, RunState::Done);
    let decision = outcome.decision.unwrap();
    assert_eq!(decision.reason_code(), "collaborator_failure");
    assert!(decision.reason().contains("round executor"));
    assert_eq!(outcome.rounds, 1);
    // One call plus two retries.
    assert_eq!(
        executor
            .calls()
            .await
            .iter()
            .filter(|(_, c)| *c == Category::Generation)
            .count(),
        3
    );
    assert_eq!(
        approval.requests().await.last().map(|r| r.state),
        Some(RunState::AwaitingRedesignApproval)
    );
}

#[tokio::test]
async fn test_executor_failure_while_designing_ends_run() {
    let (collab, _executor, _store) = scripted(vec![]);
    let outcome = RunCoordinator::new(fast_config(), collab)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.final_state, RunState::Done);
    assert_eq!(
        outcome.decision.as_ref().map(Decision::reason_code),
        Some("collaborator_failure")
    );
    assert_eq!(outcome.rounds, 0);
}

#[tokio::test]
async fn test_transient_executor_failure_is_retried() {
    let (collab, executor, _store) = scripted(vec![complete_design(0.5), generation(0.9)]);
    executor.fail_next(2).await;
    let outcome = RunCoordinator::new(fast_config(), collab)
        .run()
        .await
        .unwrap();

    assert!(matches!(outcome.decision, Some(Decision::StopSuccess { .. })));
    assert_eq!(outcome.rounds, 2);
}

#[tokio::test]
async fn test_cancel_while_awaiting_approval() {
    let executor = Arc::new(ScriptedExecutor::new(vec![complete_design(0.5)]));
    let store = Arc::new(InMemoryCheckpointStore::new());
    let mut coordinator = RunCoordinator::new(
        fast_config(),
        collaborators(executor, Arc::new(PendingApproval), store.clone()),
    );
    let handle = coordinator.handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(5), coordinator.run())
        .await
        .expect("cancellation should interrupt the approval wait")
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.final_state, RunState::Done);
    assert_eq!(outcome.reason, "cancelled by operator");
    assert_eq!(outcome.rounds, 1);
    let latest = store.load_latest(outcome.run_id).await.unwrap().unwrap();
    assert_eq!(latest.state, RunState::Done);
}

#[tokio::test]
async fn test_cancel_before_first_round() {
    let (collab, executor, _store) = scripted(vec![complete_design(0.5)]);
    let mut coordinator = RunCoordinator::new(fast_config(), collab);
    coordinator.handle().cancel();

    let outcome = coordinator.run().await.unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.rounds, 0);
    assert!(executor.calls().await.is_empty());
}

#[tokio::test]
async fn test_small_context_is_compacted_between_rounds() {
    let mut config = fast_config();
    config.compaction.execution.capacity_tokens = 1_000;
    let big_turn = || vec![Turn::assistant("x".repeat(1_600))];
    let (collab, _executor, _store) = scripted(vec![
        complete_design(0.5),
        generation(0.6)
            .with_problems(vec![problem(Severity::Medium, "a")])
            .with_turns(big_turn()),
        generation(0.65)
            .with_problems(vec![problem(Severity::Medium, "a")])
            .with_turns(big_turn()),
        generation(0.9).with_turns(big_turn()),
    ]);
    let mut coordinator =
        RunCoordinator::new(config, collab).with_requirement("Build refund samples");

    let outcome = coordinator.run().await.unwrap();

    assert!(matches!(outcome.decision, Some(Decision::StopSuccess { .. })));
    let log = coordinator.compactor().log();
    assert_eq!(log.turns()[0].role, TurnRole::Summary);
    assert!(log.turns()[0].payload.starts_with("Summary of 3 earlier turns"));
}

#[tokio::test]
async fn test_resume_of_finished_run_reports_same_outcome() {
    let (collab, _executor, store) = scripted(vec![complete_design(0.5), generation(0.9)]);
    let first = RunCoordinator::new(fast_config(), collab.clone())
        .run()
        .await
        .unwrap();

    let mut resumed = RunCoordinator::resume(fast_config(), collab, first.run_id)
        .await
        .unwrap();
    let second = resumed.run().await.unwrap();

    assert_eq!(second, first);
    let latest = store.load_latest(first.run_id).await.unwrap().unwrap();
    assert_eq!(store.history(first.run_id).await.len() as u64, latest.sequence);
}

#[tokio::test]
async fn test_resume_unknown_run_fails() {
    let (collab, _executor, _store) = scripted(vec![]);
    let err = RunCoordinator::resume(fast_config(), collab, uuid::Uuid::new_v4())
        .await
        .err()
        .expect("unknown run must not resume");
    assert!(matches!(err, synthloop::DomainError::RunNotFound(_)));
}
