//! Orchestrator event vocabulary and fan-out.
//!
//! Subscribers get their own unbounded channel. Emission never blocks and a
//! dropped receiver simply unsubscribes.

use crate::core::dag::DependencyType;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::orchestration::scheduler::Assignment;
use crate::orchestration::state::SessionId;
use serde::Serialize;
use tokio::sync::mpsc;

/// Kind of a non-fatal graph problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A dependency edge was dropped because it would close a cycle.
    CycleDetected,
    /// A dependency reference matched no task and was dropped.
    UnresolvedDependency,
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarningKind::CycleDetected => write!(f, "cycle_detected"),
            WarningKind::UnresolvedDependency => write!(f, "unresolved_dependency"),
        }
    }
}

/// Events emitted by the orchestrator for every state change.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    TaskAdded {
        task: Box<Task>,
    },
    DependencyAdded {
        from: TaskId,
        to: TaskId,
        kind: DependencyType,
    },
    Warning {
        kind: WarningKind,
        message: String,
    },
    TaskAssigned {
        assignment: Assignment,
    },
    TaskStarted {
        task_id: TaskId,
    },
    TaskCompleted {
        task_id: TaskId,
        result: Option<String>,
    },
    TaskFailed {
        task_id: TaskId,
        error: String,
    },
    TaskCancelled {
        task_id: TaskId,
    },
    /// A failed task was put back into scheduling.
    TaskRetried {
        task_id: TaskId,
        status: TaskStatus,
    },
    GraphBuilt {
        task_count: usize,
        edge_count: usize,
    },
    Reset {
        session_id: SessionId,
    },
}

impl OrchestratorEvent {
    /// Wire name of the event, e.g. `task:completed`.
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorEvent::TaskAdded { .. } => "task:added",
            OrchestratorEvent::DependencyAdded { .. } => "dependency:added",
            OrchestratorEvent::Warning { .. } => "warning",
            OrchestratorEvent::TaskAssigned { .. } => "task:assigned",
            OrchestratorEvent::TaskStarted { .. } => "task:started",
            OrchestratorEvent::TaskCompleted { .. } => "task:completed",
            OrchestratorEvent::TaskFailed { .. } => "task:failed",
            OrchestratorEvent::TaskCancelled { .. } => "task:cancelled",
            OrchestratorEvent::TaskRetried { .. } => "task:retried",
            OrchestratorEvent::GraphBuilt { .. } => "graph:built",
            OrchestratorEvent::Reset { .. } => "orchestrator:reset",
        }
    }
}

/// Observer list of event channels.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<OrchestratorEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. Events emitted from now on are delivered
    /// to the returned receiver in emission order.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<OrchestratorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    pub fn emit(&mut self, event: OrchestratorEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
