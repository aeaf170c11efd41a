//! Graph planning and execution.
//!
//! This module provides:
//! - Dependency validation and wave layering
//! - The wave executor with bounded concurrency
//! - Per-step retry policies
//! - Run records and summaries

mod executor;
mod graph;
mod retry;
mod run;

pub use executor::{Executor, ExecutorConfig};
pub use graph::{ExecutionPlan, GraphBuilder};
pub use retry::{BackoffStrategy, JitterStrategy, RetryDecision, RetryPolicy};
pub use run::{AttemptRecord, FailureRecord, Run, RunSummary, StepRecord};

#[cfg(test)]
mod integration_tests;
