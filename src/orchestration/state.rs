//! Lifecycle bookkeeping for an orchestration session.
//!
//! `OrchestratorState` files every task id into exactly one status set.
//! `Assigned` and `InProgress` tasks share the running set; the exact
//! sub-state lives on the task record.

use crate::core::task::{TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The status set a task id is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSet {
    Pending,
    Blocked,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl From<TaskStatus> for StatusSet {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending => StatusSet::Pending,
            TaskStatus::Blocked => StatusSet::Blocked,
            TaskStatus::Ready => StatusSet::Ready,
            TaskStatus::Assigned | TaskStatus::InProgress => StatusSet::Running,
            TaskStatus::Completed => StatusSet::Completed,
            TaskStatus::Failed => StatusSet::Failed,
            TaskStatus::Cancelled => StatusSet::Cancelled,
        }
    }
}

/// Disjoint status sets over every task id in the session.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorState {
    pub pending: HashSet<TaskId>,
    pub blocked: HashSet<TaskId>,
    pub ready: HashSet<TaskId>,
    pub running: HashSet<TaskId>,
    pub completed: HashSet<TaskId>,
    pub failed: HashSet<TaskId>,
    pub cancelled: HashSet<TaskId>,
}

impl OrchestratorState {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_mut(&mut self, set: StatusSet) -> &mut HashSet<TaskId> {
        match set {
            StatusSet::Pending => &mut self.pending,
            StatusSet::Blocked => &mut self.blocked,
            StatusSet::Ready => &mut self.ready,
            StatusSet::Running => &mut self.running,
            StatusSet::Completed => &mut self.completed,
            StatusSet::Failed => &mut self.failed,
            StatusSet::Cancelled => &mut self.cancelled,
        }
    }

    fn sets(&self) -> [(StatusSet, &HashSet<TaskId>); 7] {
        [
            (StatusSet::Pending, &self.pending),
            (StatusSet::Blocked, &self.blocked),
            (StatusSet::Ready, &self.ready),
            (StatusSet::Running, &self.running),
            (StatusSet::Completed, &self.completed),
            (StatusSet::Failed, &self.failed),
            (StatusSet::Cancelled, &self.cancelled),
        ]
    }

    /// File a new id under `status`, removing it from any other set.
    pub fn insert(&mut self, id: TaskId, status: TaskStatus) {
        self.remove(&id);
        self.set_mut(status.into()).insert(id);
    }

    /// Move an id between sets in one step.
    pub fn transition(&mut self, id: &TaskId, from: TaskStatus, to: TaskStatus) {
        let (from, to) = (StatusSet::from(from), StatusSet::from(to));
        if from == to {
            return;
        }
        self.set_mut(from).remove(id);
        self.set_mut(to).insert(id.clone());
    }

    fn remove(&mut self, id: &TaskId) {
        for set in [
            &mut self.pending,
            &mut self.blocked,
            &mut self.ready,
            &mut self.running,
            &mut self.completed,
            &mut self.failed,
            &mut self.cancelled,
        ] {
            set.remove(id);
        }
    }

    /// The set currently holding `id`.
    pub fn set_of(&self, id: &TaskId) -> Option<StatusSet> {
        self.sets()
            .into_iter()
            .find(|(_, ids)| ids.contains(id))
            .map(|(set, _)| set)
    }

    pub fn len(&self) -> usize {
        self.sets().iter().map(|(_, ids)| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nothing waiting and nothing running.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
            && self.blocked.is_empty()
            && self.ready.is_empty()
            && self.running.is_empty()
    }

    /// Check that every id in `all` sits in exactly one set and no set holds
    /// an unknown id.
    pub fn is_partition_of<'a>(&self, all: impl IntoIterator<Item = &'a TaskId>) -> bool {
        let all: Vec<&TaskId> = all.into_iter().collect();
        let each_once = all.iter().all(|id| {
            self.sets()
                .iter()
                .filter(|(_, ids)| ids.contains(*id))
                .count()
                == 1
        });
        each_once && self.len() == all.len()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
