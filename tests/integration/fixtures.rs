//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Predefined task sets and task lists
//! - Building orchestrators from them
//! - A runner harness wired to simulated workers

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use maestro::config::Config;
use maestro::core::dag::{DependencyType, TaskDAG};
use maestro::core::task::{Task, TaskId};
use maestro::orchestration::{
    simulate_workers, Orchestrator, OrchestratorEvent, ProgressReport, Runner, Worker,
};

pub fn id(s: &str) -> TaskId {
    TaskId::from(s)
}

/// Create a task whose id is its name.
pub fn test_task(name: &str, minutes: u32) -> Task {
    Task::new(name, name).with_duration(minutes)
}

/// Create `count` tasks with no dependencies.
pub fn independent_tasks(count: usize) -> Vec<Task> {
    (0..count)
        .map(|i| test_task(&format!("task-{}", i), 10))
        .collect()
}

/// A(10) -> B(20), A -> C(5, parallel).
pub fn fan_out_dag() -> TaskDAG {
    let mut dag = TaskDAG::new();
    dag.add_task(test_task("A", 10));
    dag.add_task(test_task("B", 20));
    dag.add_task(test_task("C", 5).parallel());
    dag.add_dependency(&id("A"), &id("B"), DependencyType::Explicit)
        .unwrap();
    dag.add_dependency(&id("A"), &id("C"), DependencyType::Explicit)
        .unwrap();
    dag
}

/// A -> B -> C.
pub fn chain_dag() -> TaskDAG {
    let mut dag = TaskDAG::new();
    for name in ["A", "B", "C"] {
        dag.add_task(test_task(name, 10));
    }
    dag.add_dependency(&id("A"), &id("B"), DependencyType::Explicit)
        .unwrap();
    dag.add_dependency(&id("B"), &id("C"), DependencyType::Explicit)
        .unwrap();
    dag
}

/// A, B and C chained through dependency references, D on its own.
pub fn chain_tasks() -> Vec<Task> {
    vec![
        test_task("A", 10),
        test_task("B", 10).with_dependency("A"),
        test_task("C", 10).with_dependency("B"),
        test_task("D", 10),
    ]
}

/// A realistic task list with sections and every annotation kind.
pub const PROJECT_TASKS: &str = "\
# Release 1.0

## Foundations
- [x] Setup env [P1] @devops #infra [15m]
- [ ] Design schema [P1] @architect [2h]
  Tables for users and sessions.
- [ ] Build API [P2] @coder [1d] depends: design-schema-1

## Quality
- [ ] Write API tests @tester [3h] depends: build-api
- [ ] Lint sources [P] [20m]
- [ ] Review release notes @reviewer #docs [30m] depends: Write API tests, Lint sources
- Owner: release-team
";

/// Build an orchestrator from tasks with the default config.
pub fn orchestrator_with(tasks: Vec<Task>) -> Orchestrator {
    let mut orchestrator = Orchestrator::new(Config::default());
    orchestrator.build(tasks).unwrap();
    orchestrator
}

/// Collect every event already delivered.
pub fn drain_events(rx: &mut mpsc::UnboundedReceiver<OrchestratorEvent>) -> Vec<OrchestratorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Pool of workers named `<type>-<n>`.
pub fn workers(types: &[&str]) -> Vec<Worker> {
    types
        .iter()
        .enumerate()
        .map(|(i, kind)| Worker::new(&format!("{}-{}", kind, i + 1), kind))
        .collect()
}

/// Orchestrator shared with a runner whose workers are simulated.
pub struct RunnerHarness {
    pub orchestrator: Arc<RwLock<Orchestrator>>,
    pub events: mpsc::UnboundedReceiver<OrchestratorEvent>,
    workers: Vec<Worker>,
    fail: HashSet<TaskId>,
}

impl RunnerHarness {
    pub fn new(mut orchestrator: Orchestrator, workers: Vec<Worker>) -> Self {
        let events = orchestrator.subscribe();
        Self {
            orchestrator: Arc::new(RwLock::new(orchestrator)),
            events,
            workers,
            fail: HashSet::new(),
        }
    }

    /// Make the simulated workers fail these tasks.
    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.fail = ids.iter().map(|s| id(s)).collect();
        self
    }

    /// Run to the end and return the final progress report.
    pub async fn run(&self) -> ProgressReport {
        let (assign_tx, assign_rx) = mpsc::unbounded_channel();
        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let executor = simulate_workers(assign_rx, report_tx, self.fail.clone());

        let runner = Runner::new(
            Arc::clone(&self.orchestrator),
            self.workers.clone(),
            assign_tx,
        );
        let report = runner.run(&mut report_rx).await.unwrap();
        drop(runner);
        executor.await.unwrap();
        report
    }
}
