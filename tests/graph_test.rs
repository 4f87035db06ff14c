mod common;

use common::make_graph;
use taskweave::graph::{detect_cycles, normalize_dependencies, TaskGraph};
use taskweave::tw_error::TwError;
use taskweave::types::TaskStatus;

fn ready_names(graph: &TaskGraph) -> Vec<&str> {
    graph.ready_tasks().iter().map(|t| t.name.as_str()).collect()
}

// --- Construction ---

#[test]
fn construction_strips_self_references_and_none_markers() {
    let graph = make_graph(&[("A", &["A", "None"]), ("B", &["-", "A", "A"])]);
    assert!(graph.get("A").unwrap().dependencies.is_empty());
    assert_eq!(graph.get("B").unwrap().dependencies, vec!["A".to_string()]);
}

#[test]
fn construction_rejects_duplicate_names() {
    let err = TaskGraph::from_declarations(vec![("A", Vec::<&str>::new()), ("A", vec![])])
        .unwrap_err();
    assert!(matches!(err, TwError::DuplicateTask(ref n) if n == "A"));
}

#[test]
fn all_tasks_start_pending_in_declaration_order() {
    let graph = make_graph(&[("c", &[]), ("a", &[]), ("b", &[])]);
    assert_eq!(graph.pending_names(), vec!["c", "a", "b"]);
    assert_eq!(graph.len(), 3);
}

#[test]
fn normalize_keeps_first_occurrence_order() {
    assert_eq!(
        normalize_dependencies("X", &["b", " a ", "b", "n/a"]),
        vec!["b".to_string(), "a".to_string()]
    );
}

// --- Readiness ---

#[test]
fn ready_tasks_require_every_dependency_completed() {
    let mut graph = make_graph(&[("A", &[]), ("B", &[]), ("C", &["A", "B"])]);
    assert_eq!(ready_names(&graph), vec!["A", "B"]);

    graph.set_status("A", TaskStatus::Completed).unwrap();
    assert_eq!(ready_names(&graph), vec!["B"]);

    graph.set_status("B", TaskStatus::Running).unwrap();
    assert!(ready_names(&graph).is_empty());

    graph.set_status("B", TaskStatus::Completed).unwrap();
    assert_eq!(ready_names(&graph), vec!["C"]);
}

#[test]
fn failed_dependency_does_not_satisfy() {
    let mut graph = make_graph(&[("A", &[]), ("B", &["A"])]);
    graph.set_status("A", TaskStatus::Failed).unwrap();
    assert!(ready_names(&graph).is_empty());
    assert_eq!(graph.unmet_dependencies("B"), vec!["A".to_string()]);
}

#[test]
fn missing_dependency_is_never_ready() {
    let mut graph = make_graph(&[("A", &[]), ("B", &["ghost"])]);
    graph.set_status("A", TaskStatus::Completed).unwrap();
    assert!(ready_names(&graph).is_empty());
    assert_eq!(
        graph.dangling_dependencies(),
        vec![("B".to_string(), "ghost".to_string())]
    );
}

#[test]
fn set_status_on_unknown_task_errors() {
    let mut graph = make_graph(&[("A", &[])]);
    assert!(matches!(
        graph.set_status("Z", TaskStatus::Completed),
        Err(TwError::TaskNotFound(_))
    ));
}

#[test]
fn status_filters_partition_tasks() {
    let mut graph = make_graph(&[("A", &[]), ("B", &[]), ("C", &[]), ("D", &[])]);
    graph.set_status("A", TaskStatus::Completed).unwrap();
    graph.set_status("B", TaskStatus::Failed).unwrap();
    graph.set_status("C", TaskStatus::Running).unwrap();

    assert_eq!(graph.completed_names(), vec!["A"]);
    assert_eq!(graph.failed_names(), vec!["B"]);
    assert_eq!(graph.running_names(), vec!["C"]);
    assert_eq!(graph.pending_names(), vec!["D"]);
}

// --- Rebuild ---

#[test]
fn rebuild_reloads_only_pending_tasks() {
    let mut graph = make_graph(&[("A", &[]), ("B", &["C"]), ("C", &["B"])]);
    graph.set_status("A", TaskStatus::Completed).unwrap();

    let mut reloaded = Vec::new();
    let rebuilt = graph
        .rebuild_pending(|name| {
            reloaded.push(name.to_string());
            Ok(match name {
                "C" => vec!["A".to_string(), "C".to_string()],
                _ => vec!["C".to_string()],
            })
        })
        .unwrap();

    assert_eq!(reloaded, vec!["B", "C"]);
    assert_eq!(rebuilt.status_of("A"), Some(TaskStatus::Completed));
    assert_eq!(rebuilt.get("C").unwrap().dependencies, vec!["A".to_string()]);
    assert!(detect_cycles(&rebuilt).is_empty());
    // the original graph is untouched
    assert_eq!(graph.get("C").unwrap().dependencies, vec!["B".to_string()]);
}

#[test]
fn rebuild_propagates_reload_errors() {
    let graph = make_graph(&[("A", &[])]);
    let result = graph.rebuild_pending(|_| Err(TwError::Store("disk gone".to_string())));
    assert!(matches!(result, Err(TwError::Store(_))));
}

// --- Cycle detection ---

#[test]
fn acyclic_graph_has_no_cycles() {
    let graph = make_graph(&[("A", &[]), ("B", &["A"]), ("C", &["A", "B"])]);
    assert!(detect_cycles(&graph).is_empty());
}

#[test]
fn two_cycle_repeats_first_element() {
    let graph = make_graph(&[("A", &["B"]), ("B", &["A"])]);
    assert_eq!(
        detect_cycles(&graph),
        vec![vec!["A".to_string(), "B".to_string(), "A".to_string()]]
    );
}

#[test]
fn three_cycle_is_reported_as_path() {
    let graph = make_graph(&[("A", &["B"]), ("B", &["C"]), ("C", &["A"]), ("D", &["A"])]);
    let cycles = detect_cycles(&graph);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0], vec!["A", "B", "C", "A"]);
}

#[test]
fn disjoint_cycles_are_all_found() {
    let graph = make_graph(&[
        ("A", &["B"]),
        ("B", &["A"]),
        ("C", &["D"]),
        ("D", &["C"]),
    ]);
    let cycles = detect_cycles(&graph);
    assert_eq!(cycles.len(), 2);
    for cycle in &cycles {
        assert_eq!(cycle.first(), cycle.last());
    }
}

#[test]
fn dangling_edges_are_not_cycles() {
    let graph = make_graph(&[("A", &["ghost"]), ("B", &["A"])]);
    assert!(detect_cycles(&graph).is_empty());
}
