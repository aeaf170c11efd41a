//! Structured event emitted once per step outcome.

use super::StepStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An event describing the terminal outcome of a step.
///
/// Events are consumed by an [`EventSink`](crate::events::EventSink) for
/// logging, monitoring, or analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    /// The event type (e.g., "step.succeeded", "step.skipped").
    #[serde(rename = "type")]
    pub event_type: String,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,

    /// The run the step belongs to.
    pub run_id: Uuid,

    /// The step identifier.
    pub step: String,

    /// The step outcome.
    pub status: StepStatus,

    /// Wall time spent in the step, including retry backoff.
    pub duration_ms: f64,

    /// Number of attempts made.
    pub attempts: usize,

    /// Error detail or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepEvent {
    /// Creates a new step event.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        step: impl Into<String>,
        status: StepStatus,
        duration_ms: f64,
        attempts: usize,
    ) -> Self {
        Self {
            event_type: format!("step.{status}"),
            timestamp: Utc::now(),
            run_id,
            step: step.into(),
            status,
            duration_ms,
            attempts,
            error: None,
        }
    }

    /// Attaches an error detail.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Converts the event to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.event_type,
            "timestamp": self.timestamp.to_rfc3339(),
            "run_id": self.run_id.to_string(),
            "step": self.step,
            "status": self.status.to_string(),
            "duration_ms": self.duration_ms,
            "attempts": self.attempts,
            "error": self.error,
        })
    }
}
