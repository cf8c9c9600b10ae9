//! Integration test suite for maestro.
//!
//! These tests drive the public API end to end: task list text in, graph
//! analysis and lifecycle transitions out.
//!
//! # Test Categories
//!
//! - `parsing_e2e`: Task list text to built graph
//! - `dag_scenarios`: Batches, critical path and cycle rejection
//! - `recovery`: Failure, retry and cancellation
//! - `parallel_scheduling`: Assignment passes across worker pools
//! - `runner`: The async run loop with simulated workers

mod fixtures;

mod dag_scenarios;
mod parallel_scheduling;
mod parsing_e2e;
mod recovery;
