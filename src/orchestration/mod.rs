//! Orchestration layer for maestro.
//!
//! Lifecycle state, worker assignment, progress tracking and the event
//! vocabulary, tied together by [`Orchestrator`] and driven asynchronously
//! by [`Runner`].

pub mod events;
pub mod orchestrator;
pub mod progress;
pub mod runner;
pub mod scheduler;
pub mod state;

pub use events::{EventBus, OrchestratorEvent, WarningKind};
pub use orchestrator::Orchestrator;
pub use progress::ProgressReport;
pub use runner::{simulate_workers, Runner, WorkerReport};
pub use scheduler::{Assignment, AssignmentEngine, Worker};
pub use state::{OrchestratorState, SessionId, StatusSet};
