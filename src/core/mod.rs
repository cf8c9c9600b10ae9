//! Core domain models for maestro.
//!
//! This module contains the task model and the dependency graph that every
//! orchestration component reads from.

pub mod dag;
pub mod task;

pub use dag::{
    Bottleneck, CriticalPath, DependencyType, ExportEdge, ExportNode, GraphExport, ParallelBatch,
    TaskDAG,
};
pub use task::{Priority, Task, TaskId, TaskStatus};
