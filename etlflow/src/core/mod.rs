//! Core types for etlflow.
//!
//! This module contains the fundamental types used throughout the framework:
//! - Step and run status enums
//! - Structured step events

mod event;
mod status;

pub use event::StepEvent;
pub use status::{RunStatus, StepStatus};

/// Payload passed between steps.
pub type Payload = serde_json::Value;
