mod common;

use common::FakeWorkspace;
use taskweave::resolver::{build_context, DeadlockResolver};
use taskweave::tw_error::DeadlockError;
use taskweave::types::TaskStatus;

#[test]
fn context_lists_cycles_dangling_and_pending_declarations() {
    let ws = FakeWorkspace::new(&[
        ("done", &[]),
        ("A", &["B", "done"]),
        ("B", &["A"]),
        ("C", &["ghost"]),
    ]);
    let mut graph = ws.graph();
    graph.set_status("done", TaskStatus::Completed).unwrap();

    let context = build_context(&graph, &ws);

    assert_eq!(context.cycles, vec![vec!["A", "B", "A"]]);
    assert_eq!(
        context.dangling,
        vec![("C".to_string(), "ghost".to_string())]
    );
    assert_eq!(context.completed, vec!["done"]);
    assert_eq!(context.blocked(), vec!["A", "B", "C"]);

    let a = &context.pending[0];
    assert_eq!(a.dependencies, vec!["B", "done"]);
    assert_eq!(a.unmet, vec!["B"]);
    assert_eq!(a.raw_declaration, "## Dependencies\nB, done");
}

#[tokio::test]
async fn successful_rewrite_returns_acyclic_graph() {
    let ws = FakeWorkspace::new(&[("A", &["B"]), ("B", &["A"])]).on_rewrite(&[("A", &[])]);
    let graph = ws.graph();

    let mut resolver = DeadlockResolver::new(&ws, &ws, 3);
    let rebuilt = resolver.resolve(&graph).await.unwrap();

    assert_eq!(resolver.attempts(), 1);
    assert!(rebuilt.get("A").unwrap().dependencies.is_empty());
    assert_eq!(rebuilt.ready_tasks().len(), 1);
}

#[tokio::test]
async fn remaining_cycles_report_rebuilt_pending_set() {
    let ws = FakeWorkspace::new(&[("A", &["B"]), ("B", &["A"])]);
    let graph = ws.graph();

    let mut resolver = DeadlockResolver::new(&ws, &ws, 3);
    let err = resolver.resolve(&graph).await.unwrap_err();

    assert_eq!(err.cycles().len(), 1);
    assert_eq!(err.blocked(), ["A".to_string(), "B".to_string()]);
    assert!(err.to_string().contains("A → B → A"));
}

#[tokio::test]
async fn agent_failure_stops_resolution() {
    let ws = FakeWorkspace::new(&[("A", &["B"]), ("B", &["A"])]).rewrite_fails("agent crashed");
    let graph = ws.graph();

    let mut resolver = DeadlockResolver::new(&ws, &ws, 3);
    let err = resolver.resolve(&graph).await.unwrap_err();

    assert!(matches!(err, DeadlockError::AgentFailed { ref reason, .. } if reason == "agent crashed"));
    assert!(err.cycles().is_empty());
}

#[tokio::test]
async fn attempts_are_capped_per_resolver() {
    let ws = FakeWorkspace::new(&[("A", &["ghost"])]);
    let graph = ws.graph();

    let mut resolver = DeadlockResolver::new(&ws, &ws, 2);
    // dangling edges are not cycles, so each attempt "succeeds" without progress
    assert!(resolver.resolve(&graph).await.is_ok());
    assert!(resolver.resolve(&graph).await.is_ok());
    let err = resolver.resolve(&graph).await.unwrap_err();

    assert_eq!(
        err,
        DeadlockError::AttemptsExhausted {
            attempts: 2,
            blocked: vec!["A".to_string()],
        }
    );
    assert_eq!(ws.rewrite_contexts().len(), 2);
}

#[tokio::test]
async fn unreadable_declarations_fail_the_reload() {
    let dir = tempfile::tempdir().unwrap();
    common::write_task(dir.path(), "A", &["B"]);
    common::write_task(dir.path(), "B", &["A"]);
    let store = taskweave::store::FileDeclarationStore::new(dir.path());
    let graph = taskweave::store::load_graph(&store).unwrap();

    // the agent deletes a task file instead of editing it
    std::fs::remove_file(store.task_file("B")).unwrap();
    let agent = FakeWorkspace::default();

    let mut resolver = DeadlockResolver::new(&store, &agent, 3);
    let err = resolver.resolve(&graph).await.unwrap_err();

    assert!(matches!(err, DeadlockError::ReloadFailed { .. }));
    assert_eq!(err.blocked(), ["A".to_string(), "B".to_string()]);
}
