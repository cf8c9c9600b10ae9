//! Assignment integration tests.
//!
//! These tests run scheduling passes over worker pools and check ordering,
//! affinity and the concurrency ceiling.

use maestro::config::Config;
use maestro::core::task::{Priority, Task, TaskStatus};
use maestro::orchestration::{Orchestrator, Worker};

use crate::fixtures::{id, independent_tasks, orchestrator_with, test_task, workers};

/// Test: Capability match wins
/// Given two equally loaded workers, only one of the required type
/// When the task is assigned
/// Then the matching worker gets it
#[test]
fn test_required_type_selects_worker() {
    let mut orchestrator =
        orchestrator_with(vec![test_task("suite", 10).with_agent_type("tester")]);

    let assignments = orchestrator.assign(&workers(&["coder", "tester"])).unwrap();

    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].worker_type, "tester");
    assert_eq!(assignments[0].worker_id, "tester-2");
}

/// Test: Critical path first
/// Given one slot and two ready tasks where only the second leads the critical path
/// When assigned
/// Then the critical task goes first despite lower priority
#[test]
fn test_critical_path_task_assigned_first() {
    let config = Config {
        max_parallel_tasks: 1,
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(config);
    orchestrator
        .build(vec![
            test_task("quick", 5).with_priority(Priority::P1),
            test_task("long", 60).with_priority(Priority::P3),
            test_task("after-long", 60).with_dependency("long"),
        ])
        .unwrap();

    let assignments = orchestrator.assign(&workers(&["coder"])).unwrap();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].task_id, id("long"));
    assert_eq!(orchestrator.status(&id("quick")).unwrap(), TaskStatus::Ready);
}

/// Test: Priority among non-critical tasks
/// Given ready tasks off the critical path with mixed priorities
/// When assigned one at a time
/// Then P1 goes before P2 before P3
#[test]
fn test_priority_order() {
    let config = Config {
        max_parallel_tasks: 1,
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(config);
    orchestrator
        .build(vec![
            test_task("anchor", 100),
            test_task("low", 5).with_priority(Priority::P3),
            test_task("high", 5).with_priority(Priority::P1),
            test_task("mid", 5),
        ])
        .unwrap();

    let pool = [Worker::new("w1", "coder")];
    let mut order = Vec::new();
    while let Some(assignment) = orchestrator.assign(&pool).unwrap().pop() {
        let task_id = assignment.task_id;
        orchestrator.start_task(&task_id).unwrap();
        orchestrator.complete_task(&task_id, None).unwrap();
        order.push(task_id.0);
    }
    assert_eq!(order, vec!["anchor", "high", "mid", "low"]);
}

/// Test: Concurrency ceiling
/// Given more ready tasks than max_parallel_tasks
/// When repeated passes run without completions
/// Then running tasks never exceed the ceiling and the rest stay ready
#[test]
fn test_max_parallel_is_respected() {
    let config = Config {
        max_parallel_tasks: 3,
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(config);
    orchestrator.build(independent_tasks(8)).unwrap();
    let pool = workers(&["coder", "tester", "reviewer"]);

    let first = orchestrator.assign(&pool).unwrap();
    let second = orchestrator.assign(&pool).unwrap();

    assert_eq!(first.len(), 3);
    assert!(second.is_empty());
    assert_eq!(orchestrator.state().running.len(), 3);
    assert_eq!(orchestrator.state().ready.len(), 5);
}

/// Test: Spread across workers
/// Given four workers and four tasks
/// When assigned in one pass
/// Then each worker receives exactly one task
#[test]
fn test_assignments_spread_by_capacity() {
    let mut orchestrator = orchestrator_with(independent_tasks(4));
    let pool = workers(&["coder", "coder", "coder", "coder"]);

    let assignments = orchestrator.assign(&pool).unwrap();

    let mut used: Vec<&str> = assignments.iter().map(|a| a.worker_id.as_str()).collect();
    used.sort();
    assert_eq!(used, vec!["coder-1", "coder-2", "coder-3", "coder-4"]);
}

/// Test: Loaded worker is skipped
/// Given a fully loaded worker of the required type and a free generic one
/// When assigned
/// Then the free worker takes the task
#[test]
fn test_fully_loaded_worker_is_skipped() {
    let mut orchestrator =
        orchestrator_with(vec![Task::new("t", "Write tests").with_agent_type("tester")]);
    let pool = [
        Worker::new("busy", "tester").with_workload(1.0),
        Worker::new("free", "coder"),
    ];

    let assignments = orchestrator.assign(&pool).unwrap();
    assert_eq!(assignments[0].worker_id, "free");
}
