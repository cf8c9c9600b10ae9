//! Task data model for the execution DAG.
//!
//! Tasks are the atomic units of work handed to agents. Each task carries
//! its scheduling attributes (priority, duration, capability, tags), the raw
//! dependency references it was declared with, and its lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier for a task.
///
/// Parsed tasks get `<slug>-<index>` so re-parsing the same text yields the
/// same identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Build the deterministic identifier for the task at `index`.
    pub fn from_slug(slug: &str, index: usize) -> Self {
        Self(format!("{}-{}", slug, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority. `P1` is the most urgent and sorts first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum Priority {
    P1,
    #[default]
    P2,
    P3,
}

impl Priority {
    /// Map a `[P<n>]` marker digit to a priority.
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Priority::P1),
            2 => Some(Priority::P2),
            3 => Some(Priority::P3),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::P1 => write!(f, "P1"),
            Priority::P2 => write!(f, "P2"),
            Priority::P3 => write!(f, "P3"),
        }
    }
}

/// Task status in its lifecycle.
///
/// ```text
/// pending -> blocked <-> ready -> assigned -> in_progress -> completed
///                                                         \-> failed -> ready (retry)
/// any non-terminal state -> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, readiness not evaluated yet.
    #[default]
    Pending,
    /// Dependencies satisfied, waiting for a worker.
    Ready,
    /// Bound to a worker but not started.
    Assigned,
    /// Worker reported the task as started.
    InProgress,
    Completed,
    Failed,
    /// At least one dependency is not completed.
    Blocked,
    Cancelled,
}

impl TaskStatus {
    /// Completed and cancelled never change again. Failed only leaves via retry.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether the task currently holds (or is about to hold) a worker.
    pub fn is_active(&self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::InProgress)
    }

    /// Check if moving from `self` to `target` is a legal lifecycle step.
    pub fn can_transition(&self, target: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, target) {
            (Pending, Blocked) | (Pending, Ready) => true,
            (Blocked, Ready) | (Ready, Blocked) => true,
            (Ready, Assigned) | (Ready, InProgress) => true,
            (Assigned, InProgress) => true,
            (Assigned, Completed) | (InProgress, Completed) => true,
            (Ready, Failed) | (Assigned, Failed) | (InProgress, Failed) => true,
            (Failed, Ready) | (Failed, Blocked) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A single task in the execution DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    pub priority: Priority,
    /// Estimated duration in minutes.
    pub estimated_duration: u32,
    /// Raw references from the task list until the graph is built, resolved
    /// task identifiers afterwards.
    pub dependencies: Vec<String>,
    /// May run alongside its siblings without an explicit marker.
    pub parallelizable: bool,
    /// Capability tag used for assignment affinity.
    pub required_agent_type: Option<String>,
    pub tags: Vec<String>,
    pub status: TaskStatus,
    /// Originating document section, for grouping only.
    pub section: Option<String>,
    /// Result reported on completion.
    pub result: Option<String>,
    /// Error reported on failure.
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with default attributes.
    pub fn new(id: impl Into<TaskId>, name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.to_string(),
            description: String::new(),
            priority: Priority::default(),
            estimated_duration: crate::config::DEFAULT_DURATION_MINUTES,
            dependencies: Vec::new(),
            parallelizable: false,
            required_agent_type: None,
            tags: Vec::new(),
            status: TaskStatus::Pending,
            section: None,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.estimated_duration = minutes;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependency(mut self, reference: &str) -> Self {
        self.dependencies.push(reference.to_string());
        self
    }

    pub fn with_agent_type(mut self, agent_type: &str) -> Self {
        self.required_agent_type = Some(agent_type.to_string());
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallelizable = true;
        self
    }

    /// Check if the task is completed, failed or cancelled.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}
