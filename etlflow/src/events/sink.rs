//! Event sink trait and implementations.

use crate::core::{StepEvent, StepStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

/// Trait for sinks that receive step events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: &StepEvent);

    /// Emits an event without awaiting.
    ///
    /// Implementations must never panic; failures are logged and dropped.
    fn try_emit(&self, event: &StepEvent);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &StepEvent) {}

    fn try_emit(&self, _event: &StepEvent) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    /// The log level for successful outcomes. Failures always log at WARN.
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: &StepEvent) {
        let data = event.to_json();
        match (event.status, self.level) {
            (StepStatus::Failed | StepStatus::Skipped | StepStatus::Cancelled, _) => {
                warn!(
                    event_type = %event.event_type,
                    run_id = %event.run_id,
                    step = %event.step,
                    attempts = event.attempts,
                    event_data = %data,
                    "Event: {}", event.event_type
                );
            }
            (_, Level::DEBUG | Level::TRACE) => {
                debug!(
                    event_type = %event.event_type,
                    run_id = %event.run_id,
                    step = %event.step,
                    event_data = %data,
                    "Event: {}", event.event_type
                );
            }
            _ => {
                info!(
                    event_type = %event.event_type,
                    run_id = %event.run_id,
                    step = %event.step,
                    event_data = %data,
                    "Event: {}", event.event_type
                );
            }
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &StepEvent) {
        self.log_event(event);
    }

    fn try_emit(&self, event: &StepEvent) {
        self.log_event(event);
    }
}

/// A collecting event sink, mostly for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<StepEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<StepEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the events of one step.
    #[must_use]
    pub fn events_for(&self, step: &str) -> Vec<StepEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.step == step)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &StepEvent) {
        self.events.write().push(event.clone());
    }

    fn try_emit(&self, event: &StepEvent) {
        self.events.write().push(event.clone());
    }
}
