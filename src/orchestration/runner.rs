//! Event-driven run loop.
//!
//! The `Runner` owns the single mutation point for a session: every change
//! goes through the write half of one `RwLock<Orchestrator>`, so concurrent
//! progress readers only ever see whole transitions. Workers are external;
//! the runner sends them [`Assignment`]s and reacts to the [`WorkerReport`]s
//! they send back. It never waits on a task itself and has no timeouts.

use crate::core::task::TaskId;
use crate::error::Result;
use crate::orchestration::orchestrator::Orchestrator;
use crate::orchestration::progress::ProgressReport;
use crate::orchestration::scheduler::{Assignment, Worker};
use crate::{mlog, mlog_debug, mlog_error, mlog_warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Signals a worker sends back about an assigned task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReport {
    Started {
        task_id: TaskId,
    },
    Completed {
        task_id: TaskId,
        result: Option<String>,
    },
    Failed {
        task_id: TaskId,
        error: String,
    },
}

impl WorkerReport {
    pub fn task_id(&self) -> &TaskId {
        match self {
            WorkerReport::Started { task_id }
            | WorkerReport::Completed { task_id, .. }
            | WorkerReport::Failed { task_id, .. } => task_id,
        }
    }
}

/// Drives an orchestrator until nothing is left to do.
///
/// # Example
///
/// ```ignore
/// let orchestrator = Arc::new(RwLock::new(orchestrator));
/// let (assign_tx, assign_rx) = mpsc::unbounded_channel();
/// let (report_tx, mut report_rx) = mpsc::unbounded_channel();
///
/// let executor = simulate_workers(assign_rx, report_tx, HashSet::new());
/// let runner = Runner::new(Arc::clone(&orchestrator), workers, assign_tx);
/// let report = runner.run(&mut report_rx).await?;
/// ```
pub struct Runner {
    orchestrator: Arc<RwLock<Orchestrator>>,
    /// Worker pool; workload is recomputed from live assignments each pass.
    workers: Vec<Worker>,
    assignment_tx: mpsc::UnboundedSender<Assignment>,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(
        orchestrator: Arc<RwLock<Orchestrator>>,
        workers: Vec<Worker>,
        assignment_tx: mpsc::UnboundedSender<Assignment>,
    ) -> Self {
        Self {
            orchestrator,
            workers,
            assignment_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops `run` at the next wake-up.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Workers with workload derived from the assignments each one holds.
    fn pool_snapshot(&self, orchestrator: &Orchestrator) -> Vec<Worker> {
        let max_parallel = orchestrator.config().max_parallel_tasks;
        let slots = max_parallel.div_ceil(self.workers.len().max(1)).max(1);
        self.workers
            .iter()
            .map(|w| {
                let load = orchestrator.worker_load(&w.id) as f64 / slots as f64;
                w.clone().with_workload(load.min(1.0))
            })
            .collect()
    }

    /// Run one scheduling pass and hand the new assignments to the workers.
    /// Returns how many were delivered.
    ///
    /// If the executor has hung up, undelivered assignments are cancelled
    /// and the run's token is cancelled with them.
    pub async fn dispatch(&self) -> Result<usize> {
        let assignments = {
            let mut orchestrator = self.orchestrator.write().await;
            let pool = self.pool_snapshot(&orchestrator);
            orchestrator.assign(&pool)?
        };

        let mut delivered = 0;
        let mut orphaned: Vec<TaskId> = Vec::new();
        for assignment in assignments {
            mlog_debug!(
                "Dispatching {} to {}",
                assignment.task_id,
                assignment.worker_id
            );
            match self.assignment_tx.send(assignment) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::SendError(assignment)) => orphaned.push(assignment.task_id),
            }
        }

        if !orphaned.is_empty() {
            mlog_error!(
                "Executor is gone, cancelling {} undelivered assignment(s)",
                orphaned.len()
            );
            let mut orchestrator = self.orchestrator.write().await;
            for task_id in &orphaned {
                if let Err(e) = orchestrator.cancel_task(task_id) {
                    mlog_error!("Could not cancel {}: {}", task_id, e);
                }
            }
            self.cancel.cancel();
        }
        Ok(delivered)
    }

    /// Apply one worker report.
    pub async fn handle(&self, report: WorkerReport) -> Result<()> {
        let mut orchestrator = self.orchestrator.write().await;
        match report {
            WorkerReport::Started { task_id } => orchestrator.start_task(&task_id),
            WorkerReport::Completed { task_id, result } => {
                orchestrator.complete_task(&task_id, result)
            }
            WorkerReport::Failed { task_id, error } => orchestrator.fail_task(&task_id, &error),
        }
    }

    /// Schedule, wait for reports and repeat until nothing is pending or
    /// running, nothing further can run, the report channel closes or the
    /// token is cancelled. Returns the final progress snapshot.
    ///
    /// A bad report (unknown task, illegal transition) is logged and skipped.
    pub async fn run(
        &self,
        reports: &mut mpsc::UnboundedReceiver<WorkerReport>,
    ) -> Result<ProgressReport> {
        mlog!("Runner started with {} worker(s)", self.workers.len());

        loop {
            if self.orchestrator.read().await.is_finished() {
                break;
            }

            self.dispatch().await?;
            if self.cancel.is_cancelled() {
                mlog!("Runner cancelled");
                break;
            }

            if self.orchestrator.read().await.state().running.is_empty() {
                mlog_warn!("Runner stalled: no running tasks and nothing assignable");
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    mlog!("Runner cancelled");
                    break;
                }
                report = reports.recv() => {
                    let Some(report) = report else {
                        mlog_warn!("Worker report channel closed");
                        break;
                    };
                    let task_id = report.task_id().clone();
                    if let Err(e) = self.handle(report).await {
                        mlog_error!("Ignoring report for {}: {}", task_id, e);
                    }
                }
            }
        }

        let progress = self.orchestrator.read().await.progress()?;
        mlog!(
            "Runner finished: {}/{} completed, {} failed",
            progress.completed,
            progress.total,
            progress.failed
        );
        Ok(progress)
    }
}

/// In-process stand-in for real workers: reports every assignment as
/// started and then completed, or failed when its id is in `fail`.
pub fn simulate_workers(
    mut assignments: mpsc::UnboundedReceiver<Assignment>,
    reports: mpsc::UnboundedSender<WorkerReport>,
    fail: HashSet<TaskId>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(assignment) = assignments.recv().await {
            let task_id = assignment.task_id;
            let _ = reports.send(WorkerReport::Started {
                task_id: task_id.clone(),
            });
            let outcome = if fail.contains(&task_id) {
                WorkerReport::Failed {
                    error: format!("simulated failure on {}", assignment.worker_id),
                    task_id,
                }
            } else {
                WorkerReport::Completed {
                    result: Some(format!("done by {}", assignment.worker_id)),
                    task_id,
                }
            };
            if reports.send(outcome).is_err() {
                break;
            }
        }
    })
}
