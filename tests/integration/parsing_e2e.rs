//! Task list parsing integration tests.
//!
//! These tests feed realistic task lists through the parser and the graph
//! build, checking ids, annotations and resolved dependencies.

use maestro::config::Config;
use maestro::core::task::{Priority, TaskStatus};
use maestro::orchestration::{Orchestrator, OrchestratorEvent, WarningKind};
use maestro::parser::{parse, TaskParser};

use crate::fixtures::{drain_events, id, PROJECT_TASKS};

/// Test: Checked item with annotations
/// Given a single checked line with priority, capability and a tag
/// When parsed
/// Then every annotation lands on the task and the name is clean
#[test]
fn test_checked_line_annotations() {
    let tasks = parse("- [x] Setup env [P1] @coder #infra");

    assert_eq!(tasks.len(), 1);
    let task = &tasks[0];
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.priority, Priority::P1);
    assert_eq!(task.required_agent_type.as_deref(), Some("coder"));
    assert_eq!(task.tags, vec!["infra".to_string()]);
    assert_eq!(task.name, "Setup env");
}

/// Test: Project task list
/// Given a task list with sections, descriptions and metadata
/// When parsed
/// Then tasks come out in document order with their annotations
#[test]
fn test_project_task_list() {
    let tasks = parse(PROJECT_TASKS);

    let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "setup-env-0",
            "design-schema-1",
            "build-api-2",
            "write-api-tests-3",
            "lint-sources-4",
            "review-release-notes-5",
        ]
    );

    assert_eq!(tasks[0].estimated_duration, 15);
    assert_eq!(tasks[1].estimated_duration, 120);
    assert_eq!(tasks[1].description, "Tables for users and sessions.");
    assert_eq!(tasks[2].estimated_duration, 480);
    assert_eq!(tasks[2].dependencies, vec!["design-schema-1".to_string()]);
    assert!(tasks[4].parallelizable);
    assert_eq!(tasks[4].priority, Priority::P2);
    assert_eq!(
        tasks[5].dependencies,
        vec!["Write API tests".to_string(), "Lint sources".to_string()]
    );
    assert_eq!(tasks[5].tags, vec!["docs".to_string()]);
    assert_eq!(tasks[3].section.as_deref(), Some("Quality"));
    assert_eq!(tasks[1].section.as_deref(), Some("Foundations"));
}

/// Test: Idempotent ids
/// Given the same text
/// When parsed twice
/// Then the id sequences are identical
#[test]
fn test_reparse_yields_same_ids() {
    let first: Vec<_> = parse(PROJECT_TASKS).into_iter().map(|t| t.id).collect();
    let second: Vec<_> = parse(PROJECT_TASKS).into_iter().map(|t| t.id).collect();
    assert_eq!(first, second);
}

/// Test: Build from text
/// Given the project task list
/// When loaded into an orchestrator
/// Then references resolve to ids and readiness follows the completed item
#[test]
fn test_load_resolves_references() {
    let mut orchestrator = Orchestrator::new(Config::default());
    orchestrator.load(PROJECT_TASKS).unwrap();

    assert!(orchestrator.warnings().is_empty());
    assert_eq!(orchestrator.dag().dependency_count(), 4);
    assert_eq!(
        orchestrator.task(&id("review-release-notes-5")).unwrap().dependencies,
        vec!["write-api-tests-3".to_string(), "lint-sources-4".to_string()]
    );
    assert_eq!(
        orchestrator.task(&id("write-api-tests-3")).unwrap().dependencies,
        vec!["build-api-2".to_string()]
    );

    let ready: Vec<&str> = orchestrator
        .ready_tasks()
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(ready, vec!["design-schema-1", "lint-sources-4"]);
    assert_eq!(
        orchestrator.status(&id("setup-env-0")).unwrap(),
        TaskStatus::Completed
    );
}

/// Test: Unknown reference
/// Given a task depending on something that is not in the list
/// When loaded
/// Then the dependency is dropped with an unresolved_dependency warning
#[test]
fn test_unknown_reference_is_dropped() {
    let mut orchestrator = Orchestrator::new(Config::default());
    let mut events = orchestrator.subscribe();
    orchestrator
        .load("- [ ] Deploy depends: provision-cluster")
        .unwrap();

    assert_eq!(orchestrator.dag().dependency_count(), 0);
    assert_eq!(orchestrator.ready_tasks().len(), 1);
    let warnings: Vec<WarningKind> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            OrchestratorEvent::Warning { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(warnings, vec![WarningKind::UnresolvedDependency]);
}

/// Test: Configured default duration
/// Given a config with a custom default duration
/// When a line without a duration marker is parsed
/// Then the task gets the configured duration
#[test]
fn test_config_default_duration() {
    let config = Config {
        default_duration_minutes: 45,
        ..Default::default()
    };
    let tasks = TaskParser::from_config(&config).parse("- [ ] Untimed\n- [ ] Timed [1h]");
    assert_eq!(tasks[0].estimated_duration, 45);
    assert_eq!(tasks[1].estimated_duration, 60);
}
