//! Event sinks for per-step observability.
//!
//! The executor emits exactly one [`StepEvent`](crate::core::StepEvent) per
//! step outcome to the configured sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
