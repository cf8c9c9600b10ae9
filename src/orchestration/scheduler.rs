//! Assignment of ready tasks to workers.
//!
//! The engine is a pure function of its inputs: the ready tasks, the
//! current critical path, the worker pool snapshot and the number of tasks
//! already running. It never touches task status; the orchestrator applies
//! the returned assignments.

use crate::config::{specialty_keywords, Config};
use crate::core::dag::CriticalPath;
use crate::core::task::{Task, TaskId};
use crate::mlog_debug;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Score bonus for a worker whose type equals the task's required capability.
pub const TYPE_MATCH_BONUS: usize = 10;

/// A worker available on this scheduling pass, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    #[serde(rename = "type")]
    pub worker_type: String,
    /// Fraction of capacity in use, in `[0, 1]`.
    pub workload: f64,
}

impl Worker {
    pub fn new(id: &str, worker_type: &str) -> Self {
        Self {
            id: id.to_string(),
            worker_type: worker_type.to_string(),
            workload: 0.0,
        }
    }

    pub fn with_workload(mut self, workload: f64) -> Self {
        self.workload = workload;
        self
    }
}

/// Binding of one task to one worker.
///
/// Lives while the task is assigned or in progress and is dropped, never
/// edited, when the task leaves those states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: TaskId,
    pub worker_id: String,
    pub worker_type: String,
    pub assigned_at: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
}

/// Matches ready tasks to workers by priority, capability and capacity.
#[derive(Debug, Clone)]
pub struct AssignmentEngine {
    max_parallel: usize,
    specialties: BTreeMap<String, Vec<String>>,
}

impl AssignmentEngine {
    pub fn new(max_parallel: usize, specialties: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            max_parallel,
            specialties,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_parallel_tasks, config.specialties.clone())
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Slots a worker can take this pass.
    ///
    /// `floor((1 - workload) * max_parallel / worker_count)`, raised to 1 for
    /// any worker that is not fully loaded so small pools never starve.
    pub fn capacity(&self, worker: &Worker, worker_count: usize) -> usize {
        if worker.workload >= 1.0 || worker_count == 0 {
            return 0;
        }
        let free = (1.0 - worker.workload.max(0.0)) * self.max_parallel as f64;
        ((free / worker_count as f64).floor() as usize).max(1)
    }

    /// Keyword overlap between the worker type's specialties and the task's
    /// name words and tags.
    pub fn affinity(&self, worker_type: &str, task: &Task) -> usize {
        let keywords = specialty_keywords(&self.specialties, worker_type);
        if keywords.is_empty() {
            return 0;
        }

        let mut words: HashSet<String> = task
            .name
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        words.extend(task.tags.iter().map(|t| t.to_lowercase()));

        keywords
            .iter()
            .filter(|k| words.contains(&k.to_lowercase()))
            .count()
    }

    fn score(&self, worker: &Worker, capacity: usize, task: &Task) -> usize {
        let type_match = task
            .required_agent_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(&worker.worker_type));
        capacity
            + if type_match { TYPE_MATCH_BONUS } else { 0 }
            + self.affinity(&worker.worker_type, task)
    }

    /// Order ready tasks: critical-path members first, then by priority.
    /// The sort is stable, so the caller's order breaks remaining ties.
    pub fn order<'a>(&self, ready: &[&'a Task], critical: &CriticalPath) -> Vec<&'a Task> {
        let mut ordered = ready.to_vec();
        ordered.sort_by_key(|t| (!critical.contains(&t.id), t.priority));
        ordered
    }

    /// Plan assignments for one scheduling pass.
    ///
    /// Stops once `running + assignments` reaches `max_parallel`. Tasks that
    /// find no worker with spare capacity are left out and stay ready.
    pub fn assign(
        &self,
        ready: &[&Task],
        critical: &CriticalPath,
        workers: &[Worker],
        running: usize,
    ) -> Vec<Assignment> {
        let budget = self.max_parallel.saturating_sub(running);
        let mut capacity: Vec<usize> = workers
            .iter()
            .map(|w| self.capacity(w, workers.len()))
            .collect();
        let now = Utc::now();
        let mut assignments = Vec::new();

        for task in self.order(ready, critical) {
            if assignments.len() >= budget {
                break;
            }

            let mut best: Option<(usize, usize)> = None;
            for (index, worker) in workers.iter().enumerate() {
                if capacity[index] == 0 {
                    continue;
                }
                let score = self.score(worker, capacity[index], task);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((index, score));
                }
            }

            let Some((index, score)) = best else {
                mlog_debug!("No eligible worker for task {}", task.id);
                continue;
            };

            capacity[index] -= 1;
            let worker = &workers[index];
            mlog_debug!(
                "Assigning {} to worker {} ({}), score={}",
                task.id,
                worker.id,
                worker.worker_type,
                score
            );
            assignments.push(Assignment {
                task_id: task.id.clone(),
                worker_id: worker.id.clone(),
                worker_type: worker.worker_type.clone(),
                assigned_at: now,
                estimated_completion: now + Duration::minutes(i64::from(task.estimated_duration)),
            });
        }

        assignments
    }
}

impl Default for AssignmentEngine {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
