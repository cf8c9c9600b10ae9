//! The orchestrator: graph construction, task lifecycle and scheduling passes.
//!
//! `Orchestrator` is the only writer of task status. Every transition goes
//! through one private method that checks the lifecycle table, moves the id
//! between status sets and records the change on the task in the same step,
//! so a reader holding `&Orchestrator` never sees a half-applied transition.

use crate::config::Config;
use crate::core::dag::{
    Bottleneck, CriticalPath, DependencyType, GraphExport, ParallelBatch, TaskDAG,
};
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::events::{EventBus, OrchestratorEvent, WarningKind};
use crate::orchestration::progress::ProgressReport;
use crate::orchestration::scheduler::{Assignment, AssignmentEngine, Worker};
use crate::orchestration::state::{OrchestratorState, SessionId, StatusSet};
use crate::parser::{slugify, TaskParser};
use crate::{mlog, mlog_debug, mlog_error, mlog_warn};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;

pub struct Orchestrator {
    config: Config,
    engine: AssignmentEngine,
    dag: TaskDAG,
    state: OrchestratorState,
    assignments: BTreeMap<TaskId, Assignment>,
    events: EventBus,
    session_id: SessionId,
    /// Warnings raised by the last build, in order.
    warnings: Vec<String>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            engine: AssignmentEngine::from_config(&config),
            config,
            dag: TaskDAG::new(),
            state: OrchestratorState::new(),
            assignments: BTreeMap::new(),
            events: EventBus::new(),
            session_id: SessionId::new(),
            warnings: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn dag(&self) -> &TaskDAG {
        &self.dag
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.dag.get_task(id)
    }

    /// Current status of a task.
    pub fn status(&self, id: &TaskId) -> Result<TaskStatus> {
        self.dag
            .get_task(id)
            .map(|t| t.status)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    // ========== Graph construction ==========

    /// Parse a task list and build the graph from it.
    pub fn load(&mut self, text: &str) -> Result<()> {
        let tasks = TaskParser::from_config(&self.config).parse(text);
        self.build(tasks)
    }

    /// Replace the current graph with `tasks`.
    ///
    /// Raw dependency references are resolved against the task set; edges
    /// that would close a cycle and references that match nothing are
    /// dropped with a warning. Tasks arriving as `completed` keep that
    /// status, everything else starts pending and is then sorted into
    /// ready or blocked.
    pub fn build(&mut self, tasks: Vec<Task>) -> Result<()> {
        self.dag.clear();
        self.state.clear();
        self.assignments.clear();
        self.warnings.clear();

        let mut order: Vec<TaskId> = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            if self.dag.contains_task(&task.id) {
                mlog_warn!("Duplicate task id {} ignored", task.id);
                continue;
            }
            task.status = match task.status {
                TaskStatus::Completed => TaskStatus::Completed,
                _ => TaskStatus::Pending,
            };
            self.state.insert(task.id.clone(), task.status);
            order.push(task.id.clone());
            let event = OrchestratorEvent::TaskAdded {
                task: Box::new(task.clone()),
            };
            self.dag.add_task(task);
            self.events.emit(event);
        }

        let mut previous_in_section: HashMap<Option<String>, TaskId> = HashMap::new();
        for id in &order {
            let Some(task) = self.dag.get_task(id) else {
                continue;
            };
            let references = task.dependencies.clone();
            let section = task.section.clone();
            let sequential = self.config.implicit_sequencing
                && !task.parallelizable
                && references.is_empty();

            let mut resolved: Vec<String> = Vec::new();
            for reference in &references {
                match self.resolve_reference(reference) {
                    Some(dep) if resolved.contains(&dep.0) => {}
                    Some(dep) => {
                        if self.link(&dep, id, DependencyType::Explicit)? {
                            resolved.push(dep.0);
                        }
                    }
                    None => {
                        let err = Error::UnresolvedDependency {
                            task: id.clone(),
                            reference: reference.clone(),
                        };
                        self.warn(WarningKind::UnresolvedDependency, format!("{}, dropped", err));
                    }
                }
            }

            if sequential {
                if let Some(prev) = previous_in_section.get(&section).cloned() {
                    if self.link(&prev, id, DependencyType::Sequential)? {
                        resolved.push(prev.0);
                    }
                }
            }
            previous_in_section.insert(section, id.clone());

            if let Some(task) = self.dag.get_task_mut(id) {
                task.dependencies = resolved;
            }
        }

        for id in &order {
            self.refresh(id)?;
        }

        mlog!(
            "Graph built: {} tasks, {} dependencies, {} ready, {} warnings",
            self.dag.task_count(),
            self.dag.dependency_count(),
            self.state.ready.len(),
            self.warnings.len()
        );
        self.events.emit(OrchestratorEvent::GraphBuilt {
            task_count: self.dag.task_count(),
            edge_count: self.dag.dependency_count(),
        });
        Ok(())
    }

    /// Map a raw reference to a task id.
    ///
    /// Tried in order: exact id, name slug equal to the reference slug, id
    /// starting with `<reference slug>-`, first name containing the
    /// reference (case-insensitive).
    fn resolve_reference(&self, reference: &str) -> Option<TaskId> {
        let exact = TaskId::from(reference);
        if self.dag.contains_task(&exact) {
            return Some(exact);
        }

        let tasks = self.dag.all_tasks();
        let slug = slugify(reference);
        if let Some(task) = tasks.iter().find(|t| slugify(&t.name) == slug) {
            return Some(task.id.clone());
        }

        let prefix = format!("{}-", slug);
        if let Some(task) = tasks.iter().find(|t| t.id.as_str().starts_with(&prefix)) {
            return Some(task.id.clone());
        }

        let needle = reference.to_lowercase();
        tasks
            .iter()
            .find(|t| t.name.to_lowercase().contains(&needle))
            .map(|t| t.id.clone())
    }

    /// Add `from -> to`, downgrading a cycle to a warning.
    ///
    /// Returns whether the edge is in the graph afterwards.
    fn link(&mut self, from: &TaskId, to: &TaskId, kind: DependencyType) -> Result<bool> {
        match self.dag.add_dependency(from, to, kind.clone()) {
            Ok(()) => {
                self.events.emit(OrchestratorEvent::DependencyAdded {
                    from: from.clone(),
                    to: to.clone(),
                    kind,
                });
                Ok(true)
            }
            Err(err @ Error::CycleDetected { .. }) => {
                self.warn(WarningKind::CycleDetected, format!("{}, edge dropped", err));
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn warn(&mut self, kind: WarningKind, message: String) {
        mlog_warn!("{}: {}", kind, message);
        self.warnings.push(message.clone());
        self.events.emit(OrchestratorEvent::Warning { kind, message });
    }

    // ========== Lifecycle ==========

    /// Apply one lifecycle step. Returns the previous status.
    ///
    /// Leaving the running set drops the task's assignment.
    fn set_status(&mut self, id: &TaskId, to: TaskStatus) -> Result<TaskStatus> {
        let task = self
            .dag
            .get_task_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.clone()))?;
        let from = task.status;
        if !from.can_transition(to) {
            mlog_error!("Rejected transition for {}: {} -> {}", id, from, to);
            return Err(Error::InvalidTransition {
                task: id.clone(),
                from,
                to,
            });
        }
        task.status = to;
        self.state.transition(id, from, to);
        if !to.is_active() {
            self.assignments.remove(id);
        }
        mlog_debug!("Task {}: {} -> {}", id, from, to);
        debug_assert!(self.is_consistent());
        Ok(from)
    }

    /// Re-derive ready/blocked for a task that is waiting.
    fn refresh(&mut self, id: &TaskId) -> Result<()> {
        let current = self.status(id)?;
        if !matches!(
            current,
            TaskStatus::Pending | TaskStatus::Blocked | TaskStatus::Ready
        ) {
            return Ok(());
        }
        let target = if self.dag.is_ready(id, &self.state.completed) {
            TaskStatus::Ready
        } else {
            TaskStatus::Blocked
        };
        if target != current {
            self.set_status(id, target)?;
        }
        Ok(())
    }

    fn refresh_dependents(&mut self, id: &TaskId) -> Result<()> {
        for dependent in self.dag.dependent_ids(id) {
            self.refresh(&dependent)?;
        }
        Ok(())
    }

    /// Worker reports the task started. Accepts assigned or ready tasks.
    pub fn start_task(&mut self, id: &TaskId) -> Result<()> {
        self.set_status(id, TaskStatus::InProgress)?;
        if let Some(task) = self.dag.get_task_mut(id) {
            task.started_at = Some(Utc::now());
        }
        self.events.emit(OrchestratorEvent::TaskStarted {
            task_id: id.clone(),
        });
        Ok(())
    }

    /// Mark a running task completed and release its dependents.
    pub fn complete_task(&mut self, id: &TaskId, result: Option<String>) -> Result<()> {
        self.set_status(id, TaskStatus::Completed)?;
        if let Some(task) = self.dag.get_task_mut(id) {
            task.result = result.clone();
            task.completed_at = Some(Utc::now());
        }
        self.events.emit(OrchestratorEvent::TaskCompleted {
            task_id: id.clone(),
            result,
        });
        self.refresh_dependents(id)
    }

    /// Mark a task failed. Its dependents stay blocked until it is retried
    /// and completed.
    pub fn fail_task(&mut self, id: &TaskId, error: &str) -> Result<()> {
        self.set_status(id, TaskStatus::Failed)?;
        if let Some(task) = self.dag.get_task_mut(id) {
            task.error = Some(error.to_string());
            task.completed_at = Some(Utc::now());
        }
        mlog_warn!("Task {} failed: {}", id, error);
        self.events.emit(OrchestratorEvent::TaskFailed {
            task_id: id.clone(),
            error: error.to_string(),
        });
        self.refresh_dependents(id)
    }

    /// Cancel a task in any non-terminal state. Stopping the worker is the
    /// caller's job.
    pub fn cancel_task(&mut self, id: &TaskId) -> Result<()> {
        self.set_status(id, TaskStatus::Cancelled)?;
        self.events.emit(OrchestratorEvent::TaskCancelled {
            task_id: id.clone(),
        });
        Ok(())
    }

    /// Put a failed task back into scheduling.
    pub fn retry_task(&mut self, id: &TaskId) -> Result<TaskStatus> {
        let target = if self.dag.is_ready(id, &self.state.completed) {
            TaskStatus::Ready
        } else {
            TaskStatus::Blocked
        };
        self.set_status(id, target)?;
        if let Some(task) = self.dag.get_task_mut(id) {
            task.error = None;
            task.completed_at = None;
            task.started_at = None;
        }
        self.events.emit(OrchestratorEvent::TaskRetried {
            task_id: id.clone(),
            status: target,
        });
        Ok(target)
    }

    /// Drop the graph, state and assignments and start a new session.
    pub fn reset(&mut self) {
        self.dag.clear();
        self.state.clear();
        self.assignments.clear();
        self.warnings.clear();
        self.session_id = SessionId::new();
        mlog!("Orchestrator reset, session {}", self.session_id.short());
        self.events.emit(OrchestratorEvent::Reset {
            session_id: self.session_id,
        });
    }

    // ========== Scheduling ==========

    /// Ready tasks in insertion order.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.dag
            .ready_tasks(&self.state.completed)
            .into_iter()
            .filter(|t| self.state.ready.contains(&t.id))
            .collect()
    }

    /// One scheduling pass: bind ready tasks to `workers` and mark them
    /// assigned. Tasks without an eligible worker stay ready.
    pub fn assign(&mut self, workers: &[Worker]) -> Result<Vec<Assignment>> {
        let critical = self.dag.critical_path()?;
        let planned = {
            let ready = self.ready_tasks();
            self.engine
                .assign(&ready, &critical, workers, self.state.running.len())
        };

        for assignment in &planned {
            self.set_status(&assignment.task_id, TaskStatus::Assigned)?;
            self.assignments
                .insert(assignment.task_id.clone(), assignment.clone());
            self.events.emit(OrchestratorEvent::TaskAssigned {
                assignment: assignment.clone(),
            });
        }

        if !planned.is_empty() {
            mlog!(
                "Assigned {} task(s), {} still ready",
                planned.len(),
                self.state.ready.len()
            );
        }
        Ok(planned)
    }

    pub fn assignment(&self, id: &TaskId) -> Option<&Assignment> {
        self.assignments.get(id)
    }

    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments.values()
    }

    /// Number of live assignments held by a worker.
    pub fn worker_load(&self, worker_id: &str) -> usize {
        self.assignments
            .values()
            .filter(|a| a.worker_id == worker_id)
            .count()
    }

    // ========== Analysis ==========

    pub fn critical_path(&self) -> Result<CriticalPath> {
        self.dag.critical_path()
    }

    pub fn parallel_batches(&self) -> Vec<ParallelBatch> {
        self.dag.parallel_batches()
    }

    pub fn bottlenecks(&self) -> Vec<Bottleneck> {
        self.dag.bottlenecks()
    }

    pub fn export(&self) -> Result<GraphExport> {
        self.dag.export()
    }

    pub fn progress(&self) -> Result<ProgressReport> {
        ProgressReport::compute(&self.dag, &self.state, self.session_id)
    }

    /// Nothing is waiting or running.
    pub fn is_finished(&self) -> bool {
        self.state.is_idle()
    }

    /// Something is ready or running, so another pass can change state.
    pub fn can_progress(&self) -> bool {
        !self.state.ready.is_empty() || !self.state.running.is_empty()
    }

    /// Status sets partition the task ids, each task's status matches its
    /// set, and assignments exist exactly for running tasks.
    pub fn is_consistent(&self) -> bool {
        let tasks = self.dag.all_tasks();
        let filed = tasks.iter().all(|t| {
            self.state.set_of(&t.id) == Some(StatusSet::from(t.status))
        });
        let assigned = self
            .assignments
            .keys()
            .all(|id| self.state.running.contains(id));
        self.state.is_partition_of(tasks.iter().map(|t| &t.id)) && filed && assigned
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session_id", &self.session_id)
            .field("dag", &self.dag)
            .field("assignments", &self.assignments.len())
            .finish()
    }
}
