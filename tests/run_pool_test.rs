//! Independent runs driven concurrently.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::{complete_design, fast_config, generation, problem, scripted};
use synthloop::adapters::{InMemoryCheckpointStore, ScriptedApproval, ScriptedExecutor};
use synthloop::domain::models::{Decision, Severity};
use synthloop::domain::ports::CheckpointStore;
use synthloop::services::{Collaborators, RunCoordinator, RunPool};

#[tokio::test]
async fn test_pool_runs_every_coordinator() {
    let coordinators: Vec<RunCoordinator> = (0..3)
        .map(|_| {
            let (collab, _executor, _store) = scripted(vec![
                complete_design(0.5),
                generation(0.6).with_problems(vec![problem(Severity::Low, "sparse")]),
                generation(0.9),
            ]);
            RunCoordinator::new(fast_config(), collab)
        })
        .collect();
    let expected: BTreeSet<_> = coordinators.iter().map(RunCoordinator::run_id).collect();

    let results = RunPool::new(2).run_all(coordinators).await;

    assert_eq!(results.len(), 3);
    let ids: BTreeSet<_> = results.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, expected);
    for (run_id, result) in results {
        let outcome = result.unwrap();
        assert_eq!(outcome.run_id, run_id);
        assert!(matches!(outcome.decision, Some(Decision::StopSuccess { .. })));
        assert_eq!(outcome.rounds, 3);
    }
}

#[tokio::test]
async fn test_runs_sharing_a_store_keep_separate_ledgers() {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let make = |rounds| {
        RunCoordinator::new(
            fast_config(),
            Collaborators {
                executor: Arc::new(ScriptedExecutor::new(rounds)),
                approval: Arc::new(ScriptedApproval::auto_approve()),
                summarizer: Arc::new(synthloop::adapters::ExtractiveSummarizer::default()),
                store: store.clone(),
            },
        )
    };
    let quick = make(vec![complete_design(0.5), generation(0.9)]);
    let slow = make(vec![
        complete_design(0.5),
        generation(0.5).with_problems(vec![problem(Severity::Medium, "a")]),
        generation(0.7).with_problems(vec![problem(Severity::Medium, "a")]),
        generation(0.9),
    ]);
    let (quick_id, slow_id) = (quick.run_id(), slow.run_id());

    let results = RunPool::default().run_all(vec![quick, slow]).await;
    assert!(results.iter().all(|(_, r)| r.is_ok()));

    let quick_latest = store.load_latest(quick_id).await.unwrap().unwrap();
    let slow_latest = store.load_latest(slow_id).await.unwrap().unwrap();
    assert_eq!(quick_latest.context.ledger.global().attempts, 2);
    assert_eq!(slow_latest.context.ledger.global().attempts, 4);
    assert_eq!(quick_latest.context.registry.occurrences("a"), 0);
    assert_eq!(slow_latest.context.registry.occurrences("a"), 2);
}

#[test]
fn test_pool_size_is_at_least_one() {
    assert_eq!(RunPool::new(0).max_concurrent(), 1);
    assert_eq!(RunPool::default().max_concurrent(), 4);
}
