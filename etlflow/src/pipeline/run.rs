//! Run records: per-step outcomes, attempts and summaries.

use super::ExecutionPlan;
use crate::core::{Payload, RunStatus, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One attempt of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: usize,
    /// Time spent in the step function.
    pub duration_ms: f64,
    /// Error detail if the attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a single step within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// The step identifier.
    pub step: String,
    /// Current status.
    pub status: StepStatus,
    /// Output payload, set when the step succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Payload>,
    /// Last error, set when the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why the step never ran, set when skipped or cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Every attempt made, in order.
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
    /// Wall time including retry backoff.
    pub duration_ms: f64,
}

impl StepRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn pending(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Pending,
            output: None,
            error: None,
            reason: None,
            attempts: Vec::new(),
            duration_ms: 0.0,
        }
    }

    /// Creates a record for a step that never ran.
    #[must_use]
    pub fn not_run(step: impl Into<String>, status: StepStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
            ..Self::pending(step)
        }
    }

    /// Returns the number of attempts made.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    /// Returns the error or reason to report for this record.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.error.as_deref().or(self.reason.as_deref())
    }
}

/// A failed step as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The failed step.
    pub step: String,
    /// Its last error.
    pub error: String,
    /// Attempts made before giving up.
    pub attempts: usize,
}

/// Counts of step outcomes in a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Total number of steps.
    pub total: usize,
    /// Steps that succeeded.
    pub succeeded: usize,
    /// Steps that failed.
    pub failed: usize,
    /// Steps skipped because a dependency did not succeed.
    pub skipped: usize,
    /// Steps that never started because the run was cancelled.
    pub cancelled: usize,
    /// Failure details in execution order.
    pub failures: Vec<FailureRecord>,
}

impl RunSummary {
    /// Returns true if some, but not all, steps succeeded.
    #[must_use]
    pub fn is_partial_success(&self) -> bool {
        self.succeeded > 0 && self.succeeded < self.total
    }

    /// Returns true if there were steps and none succeeded.
    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        self.total > 0 && self.succeeded == 0
    }

    /// Returns the share of steps that succeeded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64
    }
}

/// One execution of a step graph.
///
/// A run owns every step outcome for its lifetime. Outcomes start as
/// `pending` and are finalized as steps complete, exhaust retries, are
/// skipped, or are cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique run identifier.
    pub id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Overall status.
    pub status: RunStatus,
    /// Step records by identifier.
    steps: HashMap<String, StepRecord>,
    /// Step identifiers in execution order.
    order: Vec<String>,
}

impl Run {
    /// Starts a run for `plan` with every step pending.
    #[must_use]
    pub fn start(plan: &ExecutionPlan) -> Self {
        let order: Vec<String> = plan
            .execution_order()
            .into_iter()
            .map(str::to_string)
            .collect();
        let steps = order
            .iter()
            .map(|id| (id.clone(), StepRecord::pending(id.clone())))
            .collect();

        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            steps,
            order,
        }
    }

    /// Gets the record of a step.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&StepRecord> {
        self.steps.get(id)
    }

    /// Gets the status of a step.
    #[must_use]
    pub fn step_status(&self, id: &str) -> Option<StepStatus> {
        self.steps.get(id).map(|r| r.status)
    }

    /// Gets the output of a step.
    #[must_use]
    pub fn output(&self, id: &str) -> Option<&Payload> {
        self.steps.get(id).and_then(|r| r.output.as_ref())
    }

    /// Iterates over step records in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.order.iter().filter_map(|id| self.steps.get(id))
    }

    /// Returns the failed steps in execution order.
    #[must_use]
    pub fn failed_steps(&self) -> Vec<&StepRecord> {
        self.steps()
            .filter(|r| r.status == StepStatus::Failed)
            .collect()
    }

    /// Returns true if the run finished and every step succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Marks a step as running.
    pub(crate) fn mark_running(&mut self, id: &str) {
        if let Some(record) = self.steps.get_mut(id) {
            record.status = StepStatus::Running;
        }
    }

    /// Stores a finalized step record.
    pub(crate) fn record(&mut self, record: StepRecord) {
        self.steps.insert(record.step.clone(), record);
    }

    /// Computes the overall status and stamps the finish time.
    pub(crate) fn finish(&mut self) {
        let statuses: Vec<StepStatus> = self.steps.values().map(|r| r.status).collect();

        self.status = if statuses.contains(&StepStatus::Failed) {
            RunStatus::Failed
        } else if statuses.contains(&StepStatus::Cancelled) {
            RunStatus::Cancelled
        } else {
            RunStatus::Succeeded
        };
        self.finished_at = Some(Utc::now());
    }

    /// Summarizes step outcomes.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.order.len(),
            ..RunSummary::default()
        };

        for record in self.steps() {
            match record.status {
                StepStatus::Succeeded => summary.succeeded += 1,
                StepStatus::Failed => {
                    summary.failed += 1;
                    summary.failures.push(FailureRecord {
                        step: record.step.clone(),
                        error: record.error.clone().unwrap_or_default(),
                        attempts: record.attempt_count(),
                    });
                }
                StepStatus::Skipped => summary.skipped += 1,
                StepStatus::Cancelled => summary.cancelled += 1,
                StepStatus::Pending | StepStatus::Running => {}
            }
        }

        summary
    }
}
