//! Dependency graph integration tests.
//!
//! These tests check the graph analyses against small hand-checked graphs.

use std::collections::HashSet;

use maestro::core::dag::{DependencyType, TaskDAG};
use maestro::core::task::TaskId;
use maestro::Error;

use crate::fixtures::{chain_dag, fan_out_dag, id, independent_tasks, test_task};

/// Test: Fan-out batches and critical path
/// Given A(10) -> B(20) and A -> C(5)
/// When batches and the critical path are computed
/// Then batch 0 is [A], batch 1 is [B, C] and the path is A -> B (30 min)
#[test]
fn test_fan_out_scenario() {
    let dag = fan_out_dag();

    let batches = dag.parallel_batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].tasks, vec![id("A")]);
    assert_eq!(batches[1].tasks, vec![id("B"), id("C")]);
    assert_eq!(batches[1].estimated_duration, 20);

    let critical = dag.critical_path().unwrap();
    assert_eq!(critical.path, vec![id("A"), id("B")]);
    assert_eq!(critical.total_duration, 30);
}

/// Test: Cycle rejection
/// Given A -> B -> C
/// When C -> A is added
/// Then CycleDetected is returned and the graph keeps only A -> B, B -> C
#[test]
fn test_closing_edge_rejected() {
    let mut dag = chain_dag();

    let result = dag.add_dependency(&id("C"), &id("A"), DependencyType::Explicit);

    assert!(matches!(result, Err(Error::CycleDetected { .. })));
    assert_eq!(dag.task_count(), 3);
    assert_eq!(dag.dependency_count(), 2);
    assert!(dag.has_dependency(&id("A"), &id("B")));
    assert!(dag.has_dependency(&id("B"), &id("C")));
}

/// Test: Roots are the initial ready set
/// Given a mix of rooted and dependent tasks
/// When ready tasks are queried with nothing completed
/// Then exactly the tasks with no dependencies are returned
#[test]
fn test_ready_with_nothing_completed() {
    let mut dag = TaskDAG::new();
    for task in independent_tasks(3) {
        dag.add_task(task);
    }
    dag.add_task(test_task("joined", 5));
    for i in 0..3 {
        dag.add_dependency(
            &id(&format!("task-{}", i)),
            &id("joined"),
            DependencyType::Explicit,
        )
        .unwrap();
    }

    let ready: HashSet<TaskId> = dag
        .ready_tasks(&HashSet::new())
        .into_iter()
        .map(|t| t.id.clone())
        .collect();
    let expected: HashSet<TaskId> = (0..3).map(|i| id(&format!("task-{}", i))).collect();
    assert_eq!(ready, expected);
}

/// Test: Completing a batch
/// Given the batches of a layered graph
/// When batches are completed one by one
/// Then the ready set is always exactly the next batch
#[test]
fn test_completing_batches_unblocks_next_batch() {
    let mut dag = TaskDAG::new();
    for name in ["a", "b", "c", "d", "e", "f"] {
        dag.add_task(test_task(name, 10));
    }
    for (from, to) in [("a", "c"), ("b", "c"), ("b", "d"), ("c", "e"), ("d", "e"), ("a", "f")] {
        dag.add_dependency(&id(from), &id(to), DependencyType::Explicit)
            .unwrap();
    }

    let mut completed: HashSet<TaskId> = HashSet::new();
    for batch in dag.parallel_batches() {
        let ready: HashSet<TaskId> = dag
            .ready_tasks(&completed)
            .into_iter()
            .map(|t| t.id.clone())
            .collect();
        let expected: HashSet<TaskId> = batch.tasks.iter().cloned().collect();
        assert_eq!(ready, expected);
        completed.extend(batch.tasks);
    }
    assert!(dag.all_complete(&completed));
}

/// Test: Critical path is the longest path
/// Given a graph with several routes to the sink
/// When the critical path is computed
/// Then no route through the graph is longer
#[test]
fn test_critical_path_is_maximal() {
    let mut dag = TaskDAG::new();
    let durations = [("s", 5), ("x", 30), ("y", 12), ("z", 12), ("t", 4)];
    for (name, minutes) in durations {
        dag.add_task(test_task(name, minutes));
    }
    for (from, to) in [("s", "x"), ("s", "y"), ("y", "z"), ("x", "t"), ("z", "t")] {
        dag.add_dependency(&id(from), &id(to), DependencyType::Explicit)
            .unwrap();
    }

    let critical = dag.critical_path().unwrap();
    // s-x-t = 39, s-y-z-t = 33
    assert_eq!(critical.path, vec![id("s"), id("x"), id("t")]);
    assert_eq!(critical.total_duration, 39);
}

/// Test: Bottleneck ranking
/// Given the chain A -> B -> C
/// When bottlenecks are computed
/// Then A blocks two tasks and B one
#[test]
fn test_chain_bottlenecks() {
    let dag = chain_dag();
    let bottlenecks = dag.bottlenecks();
    assert_eq!(bottlenecks.len(), 2);
    assert_eq!(bottlenecks[0].task_id, id("A"));
    assert_eq!(bottlenecks[0].blocked_count, 2);
    assert_eq!(bottlenecks[1].task_id, id("B"));
}

/// Test: Clear
/// Given a populated graph
/// When cleared
/// Then it can be rebuilt from scratch
#[test]
fn test_clear_and_rebuild() {
    let mut dag = fan_out_dag();
    dag.clear();
    assert!(dag.is_empty());
    assert!(dag.parallel_batches().is_empty());

    dag.add_task(test_task("A", 1));
    assert_eq!(dag.task_count(), 1);
}
