//! Task DAG (Directed Acyclic Graph) for dependency management.
//!
//! `TaskDAG` stores tasks in a petgraph arena: nodes are addressed by
//! `NodeIndex` (stable, insertion ordered, never removed individually) and
//! edges point from a dependency to the task that waits on it. All analysis
//! here is synchronous and deterministic; ties are always broken by
//! insertion order.

use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Type of dependency between tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DependencyType {
    /// Declared with a `depends:` marker in the task list.
    #[default]
    Explicit,
    /// Inferred from the order of non-parallel tasks within a section.
    Sequential,
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyType::Explicit => write!(f, "explicit"),
            DependencyType::Sequential => write!(f, "sequential"),
        }
    }
}

/// Longest-duration chain through the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriticalPath {
    /// Task ids from the first dependency to the final task.
    pub path: Vec<TaskId>,
    /// Sum of estimated durations along `path`, in minutes, saturating at
    /// `u32::MAX`.
    pub total_duration: u32,
    /// Path members taking more than twice the path's average duration.
    pub bottlenecks: Vec<TaskId>,
}

impl CriticalPath {
    pub fn contains(&self, id: &TaskId) -> bool {
        self.path.contains(id)
    }
}

/// A wave of tasks that can run concurrently once all earlier waves finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelBatch {
    pub tasks: Vec<TaskId>,
    /// Longest task in the wave, in minutes.
    pub estimated_duration: u32,
}

/// A task that other tasks transitively wait on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bottleneck {
    pub task_id: TaskId,
    /// Number of tasks transitively blocked by this one.
    pub blocked_count: usize,
    /// `blocked_count` as a percentage of all tasks.
    pub impact: f64,
}

/// Node of an exported graph description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportNode {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub estimated_duration: u32,
    pub section: Option<String>,
    pub critical: bool,
}

/// Edge of an exported graph description, `from` must finish before `to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEdge {
    pub from: TaskId,
    pub to: TaskId,
    pub kind: DependencyType,
}

/// Node and edge lists for an external renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
}

/// The task dependency graph.
pub struct TaskDAG {
    /// The underlying directed graph.
    graph: DiGraph<Task, DependencyType>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskDAG {
    /// Create a new empty TaskDAG.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Add a task to the DAG.
    ///
    /// If a task with the same id already exists, the existing node is kept
    /// and its index returned.
    pub fn add_task(&mut self, task: Task) -> NodeIndex {
        if let Some(&index) = self.task_index.get(&task.id) {
            return index;
        }

        let id = task.id.clone();
        let index = self.graph.add_node(task);
        self.task_index.insert(id, index);
        index
    }

    /// Add a dependency: `from` must complete before `to` can start.
    ///
    /// The edge is rejected without touching the graph when `to` can already
    /// reach `from` (including `from == to`). Adding an edge that already
    /// exists is a no-op.
    ///
    /// # Errors
    /// - `TaskNotFound` if either task is not in the DAG
    /// - `CycleDetected` if the edge would close a cycle
    pub fn add_dependency(
        &mut self,
        from: &TaskId,
        to: &TaskId,
        dep_type: DependencyType,
    ) -> Result<()> {
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;

        if has_path_connecting(&self.graph, to_index, from_index, None) {
            return Err(Error::CycleDetected {
                from: from.clone(),
                to: to.clone(),
            });
        }

        if self.graph.find_edge(from_index, to_index).is_none() {
            self.graph.add_edge(from_index, to_index, dep_type);
        }
        Ok(())
    }

    fn index_of(&self, id: &TaskId) -> Result<NodeIndex> {
        self.task_index
            .get(id)
            .copied()
            .ok_or_else(|| Error::TaskNotFound(id.clone()))
    }

    /// Get a reference to a task by its ID.
    pub fn get_task(&self, id: &TaskId) -> Option<&Task> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    /// Get a mutable reference to a task by its ID.
    pub fn get_task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        if let Some(&index) = self.task_index.get(id) {
            self.graph.node_weight_mut(index)
        } else {
            None
        }
    }

    /// Get the number of tasks in the DAG.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependencies (edges) in the DAG.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if a dependency exists between two tasks.
    pub fn has_dependency(&self, from: &TaskId, to: &TaskId) -> bool {
        self.get_dependency(from, to).is_some()
    }

    /// Get the dependency type between two tasks, if one exists.
    pub fn get_dependency(&self, from: &TaskId, to: &TaskId) -> Option<&DependencyType> {
        let from_idx = self.task_index.get(from)?;
        let to_idx = self.task_index.get(to)?;
        let edge = self.graph.find_edge(*from_idx, *to_idx)?;
        self.graph.edge_weight(edge)
    }

    /// Neighbor indices in insertion order (petgraph yields newest edge first).
    fn neighbors_sorted(&self, index: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> =
            self.graph.neighbors_directed(index, direction).collect();
        neighbors.sort();
        neighbors
    }

    /// Get all tasks that the given task depends on (predecessors).
    pub fn get_dependencies(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors_of(id, Direction::Incoming)
    }

    /// Get all tasks that depend on the given task (successors).
    pub fn get_dependents(&self, id: &TaskId) -> Vec<&Task> {
        self.neighbors_of(id, Direction::Outgoing)
    }

    fn neighbors_of(&self, id: &TaskId, direction: Direction) -> Vec<&Task> {
        match self.task_index.get(id) {
            Some(&index) => self
                .neighbors_sorted(index, direction)
                .into_iter()
                .filter_map(|n| self.graph.node_weight(n))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Ids of the tasks `id` depends on.
    pub fn dependency_ids(&self, id: &TaskId) -> Vec<TaskId> {
        self.get_dependencies(id)
            .into_iter()
            .map(|t| t.id.clone())
            .collect()
    }

    /// Ids of the tasks waiting on `id`.
    pub fn dependent_ids(&self, id: &TaskId) -> Vec<TaskId> {
        self.get_dependents(id)
            .into_iter()
            .map(|t| t.id.clone())
            .collect()
    }

    /// Get all tasks in insertion order.
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.graph.node_weights().collect()
    }

    /// Check if the DAG is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if the DAG contains a task.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    /// Remove every task and dependency.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.task_index.clear();
    }

    // ========== Scheduling Operations ==========

    /// Get all tasks whose dependencies are all in `completed`.
    ///
    /// Completed tasks themselves are excluded. This is recomputed on every
    /// call; nothing is cached between state changes.
    pub fn ready_tasks<'a>(&'a self, completed: &HashSet<TaskId>) -> Vec<&'a Task> {
        self.graph
            .node_indices()
            .filter_map(|index| {
                let task = self.graph.node_weight(index)?;
                if completed.contains(&task.id) {
                    return None;
                }
                self.dependencies_satisfied(index, completed)
                    .then_some(task)
            })
            .collect()
    }

    /// Check whether every dependency of `id` is in `completed`.
    pub fn is_ready(&self, id: &TaskId, completed: &HashSet<TaskId>) -> bool {
        self.task_index
            .get(id)
            .map(|&index| self.dependencies_satisfied(index, completed))
            .unwrap_or(false)
    }

    fn dependencies_satisfied(&self, index: NodeIndex, completed: &HashSet<TaskId>) -> bool {
        self.graph
            .neighbors_directed(index, Direction::Incoming)
            .all(|dep| {
                self.graph
                    .node_weight(dep)
                    .map(|t| completed.contains(&t.id))
                    .unwrap_or(false)
            })
    }

    /// Check if all tasks in the DAG are in `completed`.
    pub fn all_complete(&self, completed: &HashSet<TaskId>) -> bool {
        self.task_index.keys().all(|id| completed.contains(id))
    }

    /// Kahn's algorithm, seeding and releasing nodes in insertion order.
    fn topological_indices(&self) -> Result<Vec<NodeIndex>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for next in self.neighbors_sorted(node, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != self.graph.node_count() {
            return Err(Error::Validation(
                "Task graph contains a cycle".to_string(),
            ));
        }
        Ok(order)
    }

    /// Get tasks in topological order (each task after all its dependencies).
    ///
    /// # Errors
    /// Returns an error if the graph contains a cycle, which `add_dependency`
    /// never allows.
    pub fn topological_order(&self) -> Result<Vec<&Task>> {
        Ok(self
            .topological_indices()?
            .into_iter()
            .filter_map(|index| self.graph.node_weight(index))
            .collect())
    }

    fn duration(&self, index: NodeIndex) -> u32 {
        self.graph
            .node_weight(index)
            .map(|t| t.estimated_duration)
            .unwrap_or(0)
    }

    fn id_at(&self, index: NodeIndex) -> Option<TaskId> {
        self.graph.node_weight(index).map(|t| t.id.clone())
    }

    /// Compute the critical path with a longest-path relaxation over the
    /// topological order.
    ///
    /// The path ends at the dependent-free task with the largest accumulated
    /// duration; equal candidates resolve to the earliest inserted task, both
    /// for the end node and for each predecessor step.
    pub fn critical_path(&self) -> Result<CriticalPath> {
        let order = self.topological_indices()?;
        let node_count = self.graph.node_count();
        let mut finish: Vec<u32> = vec![0; node_count];
        let mut predecessor: Vec<Option<NodeIndex>> = vec![None; node_count];

        for &node in &order {
            let mut best: Option<NodeIndex> = None;
            for dep in self.neighbors_sorted(node, Direction::Incoming) {
                if best.map_or(true, |b| finish[dep.index()] > finish[b.index()]) {
                    best = Some(dep);
                }
            }
            let inherited = best.map_or(0, |b| finish[b.index()]);
            finish[node.index()] = inherited.saturating_add(self.duration(node));
            predecessor[node.index()] = best;
        }

        let mut end: Option<NodeIndex> = None;
        for node in self.graph.node_indices() {
            let is_sink = self
                .graph
                .neighbors_directed(node, Direction::Outgoing)
                .next()
                .is_none();
            if is_sink && end.map_or(true, |e| finish[node.index()] > finish[e.index()]) {
                end = Some(node);
            }
        }

        let Some(end) = end else {
            return Ok(CriticalPath::default());
        };

        let mut indices = vec![end];
        let mut cursor = end;
        while let Some(prev) = predecessor[cursor.index()] {
            indices.push(prev);
            cursor = prev;
        }
        indices.reverse();

        let total_duration = indices
            .iter()
            .fold(0u32, |acc, &n| acc.saturating_add(self.duration(n)));
        let average = total_duration as f64 / indices.len() as f64;
        let bottlenecks = indices
            .iter()
            .filter(|&&n| self.duration(n) as f64 > 2.0 * average)
            .filter_map(|&n| self.id_at(n))
            .collect();

        Ok(CriticalPath {
            path: indices.iter().filter_map(|&n| self.id_at(n)).collect(),
            total_duration,
            bottlenecks,
        })
    }

    /// Partition all tasks into waves: wave k holds exactly the tasks whose
    /// dependencies all sit in waves 0..k.
    pub fn parallel_batches(&self) -> Vec<ParallelBatch> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        let mut wave: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .collect();

        let mut batches = Vec::new();
        while !wave.is_empty() {
            let mut next_wave = Vec::new();
            for &node in &wave {
                for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    in_degree[next.index()] -= 1;
                    if in_degree[next.index()] == 0 {
                        next_wave.push(next);
                    }
                }
            }
            next_wave.sort();

            batches.push(ParallelBatch {
                estimated_duration: wave.iter().map(|&n| self.duration(n)).max().unwrap_or(0),
                tasks: wave.iter().filter_map(|&n| self.id_at(n)).collect(),
            });
            wave = next_wave;
        }
        batches
    }

    /// Tasks that transitively block others, most blocking first.
    pub fn bottlenecks(&self) -> Vec<Bottleneck> {
        let total = self.graph.node_count();
        let mut result: Vec<Bottleneck> = self
            .graph
            .node_indices()
            .filter_map(|node| {
                let blocked_count = self.transitive_dependents(node).len();
                if blocked_count == 0 {
                    return None;
                }
                Some(Bottleneck {
                    task_id: self.id_at(node)?,
                    blocked_count,
                    impact: blocked_count as f64 / total as f64 * 100.0,
                })
            })
            .collect();

        // Stable sort keeps insertion order among equals.
        result.sort_by(|a, b| b.blocked_count.cmp(&a.blocked_count));
        result
    }

    fn transitive_dependents(&self, start: NodeIndex) -> HashSet<NodeIndex> {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        visited
    }

    /// Describe the graph as plain node and edge lists.
    pub fn export(&self) -> Result<GraphExport> {
        let critical = self.critical_path()?;
        let nodes = self
            .graph
            .node_weights()
            .map(|task| ExportNode {
                id: task.id.clone(),
                name: task.name.clone(),
                status: task.status,
                estimated_duration: task.estimated_duration,
                section: task.section.clone(),
                critical: critical.contains(&task.id),
            })
            .collect();

        let mut edges: Vec<ExportEdge> = self
            .graph
            .edge_indices()
            .filter_map(|edge| {
                let (from, to) = self.graph.edge_endpoints(edge)?;
                Some(ExportEdge {
                    from: self.id_at(from)?,
                    to: self.id_at(to)?,
                    kind: self.graph.edge_weight(edge)?.clone(),
                })
            })
            .collect();
        edges.sort_by(|a, b| {
            let key = |e: &ExportEdge| (self.task_index.get(&e.from).copied(), self.task_index.get(&e.to).copied());
            key(a).cmp(&key(b))
        });

        Ok(GraphExport { nodes, edges })
    }
}

impl Default for TaskDAG {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskDAG {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDAG")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
