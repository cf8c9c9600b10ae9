//! Failure and recovery integration tests.
//!
//! These tests verify that failures hold back dependents, that retries put
//! work back into scheduling, and that cancellation is cooperative.

use maestro::core::task::TaskStatus;
use maestro::orchestration::{OrchestratorEvent, Worker};
use maestro::Error;

use crate::fixtures::{chain_tasks, drain_events, id, orchestrator_with};

/// Test: Failure keeps dependents blocked
/// Given A -> B -> C with A completed and B running
/// When B fails, is retried and then completes
/// Then C stays blocked until B's completion, and only then becomes ready
#[test]
fn test_failed_dependency_blocks_until_retry_completes() {
    let mut orchestrator = orchestrator_with(chain_tasks());
    let workers = [Worker::new("w1", "coder")];

    orchestrator.assign(&workers).unwrap();
    orchestrator.start_task(&id("A")).unwrap();
    orchestrator.complete_task(&id("A"), None).unwrap();

    orchestrator.assign(&workers).unwrap();
    orchestrator.start_task(&id("B")).unwrap();
    orchestrator.fail_task(&id("B"), "compiler crashed").unwrap();

    assert_eq!(orchestrator.status(&id("B")).unwrap(), TaskStatus::Failed);
    assert_eq!(orchestrator.status(&id("C")).unwrap(), TaskStatus::Blocked);
    assert!(orchestrator.assignment(&id("B")).is_none());

    // Another pass must not pick up C.
    let assignments = orchestrator.assign(&workers).unwrap();
    assert!(assignments.iter().all(|a| a.task_id != id("C")));

    assert_eq!(orchestrator.retry_task(&id("B")).unwrap(), TaskStatus::Ready);
    assert_eq!(orchestrator.status(&id("C")).unwrap(), TaskStatus::Blocked);

    orchestrator.start_task(&id("B")).unwrap();
    orchestrator.complete_task(&id("B"), Some("ok".to_string()))
        .unwrap();
    assert_eq!(orchestrator.status(&id("C")).unwrap(), TaskStatus::Ready);
    assert!(orchestrator.is_consistent());
}

/// Test: Failure event
/// Given a running task
/// When it fails
/// Then a task:failed event carries the error
#[test]
fn test_failure_event_carries_error() {
    let mut orchestrator = orchestrator_with(chain_tasks());
    let mut events = orchestrator.subscribe();

    orchestrator.start_task(&id("A")).unwrap();
    orchestrator.fail_task(&id("A"), "out of memory").unwrap();

    let failed: Vec<String> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            OrchestratorEvent::TaskFailed { task_id, error } if task_id == id("A") => Some(error),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec!["out of memory".to_string()]);
}

/// Test: Progress after failure
/// Given a failed task in a chain
/// When progress is computed
/// Then the failure and the blocked dependents are counted
#[test]
fn test_progress_counts_failure() {
    let mut orchestrator = orchestrator_with(chain_tasks());
    orchestrator.start_task(&id("A")).unwrap();
    orchestrator.fail_task(&id("A"), "boom").unwrap();

    let progress = orchestrator.progress().unwrap();
    assert_eq!(progress.total, 4);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.blocked, 2);
    assert_eq!(progress.ready, 1);
    assert_eq!(progress.completed, 0);
    assert_eq!(progress.percent_complete, 0.0);
}

/// Test: Cancellation
/// Given an assigned task
/// When it is cancelled
/// Then its assignment is gone and its dependents stay blocked
#[test]
fn test_cancel_assigned_task() {
    let mut orchestrator = orchestrator_with(chain_tasks());
    orchestrator.assign(&[Worker::new("w1", "coder")]).unwrap();
    assert_eq!(orchestrator.status(&id("A")).unwrap(), TaskStatus::Assigned);

    orchestrator.cancel_task(&id("A")).unwrap();

    assert!(orchestrator.assignment(&id("A")).is_none());
    assert_eq!(orchestrator.status(&id("B")).unwrap(), TaskStatus::Blocked);
    assert!(matches!(
        orchestrator.start_task(&id("A")),
        Err(Error::InvalidTransition { .. })
    ));
    assert!(orchestrator.is_consistent());
}

/// Test: Unknown ids
/// Given an orchestrator
/// When lifecycle calls name an unknown task
/// Then TaskNotFound is returned and nothing changes
#[test]
fn test_unknown_task_surfaces_error() {
    let mut orchestrator = orchestrator_with(chain_tasks());
    let before = orchestrator.progress().unwrap();

    for result in [
        orchestrator.start_task(&id("ghost")),
        orchestrator.cancel_task(&id("ghost")),
        orchestrator.retry_task(&id("ghost")).map(|_| ()),
    ] {
        assert!(matches!(result, Err(Error::TaskNotFound(_))));
    }

    let after = orchestrator.progress().unwrap();
    assert_eq!(before.ready, after.ready);
    assert_eq!(before.blocked, after.blocked);
}

/// Test: Reset
/// Given a session with progress
/// When reset
/// Then the graph is empty and a new session id is issued
#[test]
fn test_reset_clears_session() {
    let mut orchestrator = orchestrator_with(chain_tasks());
    orchestrator.start_task(&id("A")).unwrap();
    let session = orchestrator.session_id();

    orchestrator.reset();

    assert_ne!(orchestrator.session_id(), session);
    let progress = orchestrator.progress().unwrap();
    assert_eq!(progress.total, 0);
    assert_eq!(progress.session_id, orchestrator.session_id());
}
