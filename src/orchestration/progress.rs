//! Progress reporting.

use crate::core::dag::{ParallelBatch, TaskDAG};
use crate::core::task::TaskId;
use crate::orchestration::state::{OrchestratorState, SessionId};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Snapshot of a session's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub session_id: SessionId,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Assigned or in progress.
    pub running: usize,
    pub ready: usize,
    pub blocked: usize,
    pub pending: usize,
    pub cancelled: usize,
    pub percent_complete: f64,
    /// Minutes, summed per unfinished parallel batch.
    pub estimated_time_remaining: u32,
    pub critical_path_completed: usize,
    pub critical_path_total: usize,
}

impl ProgressReport {
    /// Build a report from the graph and the current status sets.
    pub fn compute(
        dag: &TaskDAG,
        state: &OrchestratorState,
        session_id: SessionId,
    ) -> Result<Self> {
        let total = dag.task_count();
        let critical = dag.critical_path()?;
        let percent_complete = if total == 0 {
            0.0
        } else {
            state.completed.len() as f64 / total as f64 * 100.0
        };

        Ok(Self {
            session_id,
            total,
            completed: state.completed.len(),
            failed: state.failed.len(),
            running: state.running.len(),
            ready: state.ready.len(),
            blocked: state.blocked.len(),
            pending: state.pending.len(),
            cancelled: state.cancelled.len(),
            percent_complete,
            estimated_time_remaining: remaining_minutes(&dag.parallel_batches(), state),
            critical_path_completed: critical
                .path
                .iter()
                .filter(|id| state.completed.contains(*id))
                .count(),
            critical_path_total: critical.path.len(),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.pending + self.blocked + self.ready + self.running == 0
    }
}

/// Overlapping tasks share a batch, so each unfinished batch counts once at
/// its own estimated duration. Cancelled tasks never run and count as done.
pub fn remaining_minutes(batches: &[ParallelBatch], state: &OrchestratorState) -> u32 {
    let done = |id: &TaskId| state.completed.contains(id) || state.cancelled.contains(id);
    batches
        .iter()
        .filter(|batch| batch.tasks.iter().any(|id| !done(id)))
        .fold(0u32, |acc, batch| acc.saturating_add(batch.estimated_duration))
}

impl std::fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Session {}", self.session_id.short())?;
        writeln!(
            f,
            "  {}/{} completed ({:.1}%), {} failed, {} cancelled",
            self.completed, self.total, self.percent_complete, self.failed, self.cancelled
        )?;
        writeln!(
            f,
            "  {} running, {} ready, {} blocked, {} pending",
            self.running, self.ready, self.blocked, self.pending
        )?;
        writeln!(
            f,
            "  critical path {}/{}",
            self.critical_path_completed, self.critical_path_total
        )?;
        write!(f, "  ~{} min remaining", self.estimated_time_remaining)
    }
}
