//! Error types for the etlflow framework.
//!
//! Configuration errors (duplicate step, unknown step, dependency cycle) are
//! fatal when the graph is built and are never retried. Step failures are
//! never returned as `Err` from the executor; they are recorded on the
//! [`Run`](crate::pipeline::Run) instead.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for etlflow operations.
#[derive(Debug, Error)]
pub enum EtlflowError {
    /// A step was registered twice.
    #[error("{0}")]
    DuplicateStep(#[from] DuplicateStepError),

    /// A step id was looked up or referenced but never registered.
    #[error("{0}")]
    UnknownStep(#[from] UnknownStepError),

    /// The dependency graph contains a cycle.
    #[error("{0}")]
    CyclicDependency(#[from] CyclicDependencyError),

    /// Invalid configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A store adapter could not be set up.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A fetch adapter could not be set up.
    #[error("{0}")]
    Fetch(#[from] FetchError),
}

/// Metadata about a configuration error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-001-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when registering a step whose id is already taken.
#[derive(Debug, Clone, Error)]
#[error("Step '{step}' is already registered")]
pub struct DuplicateStepError {
    /// The duplicated step id.
    pub step: String,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl DuplicateStepError {
    /// Creates a new duplicate step error.
    #[must_use]
    pub fn new(step: impl Into<String>) -> Self {
        let step = step.into();
        let info = ContractErrorInfo::new(
            "REGISTRY-001-DUPLICATE",
            format!("Step id '{step}' is registered more than once"),
        )
        .with_fix_hint("Give every step a unique identifier.");

        Self {
            step,
            error_info: info,
        }
    }
}

/// Error raised when a step id is not present in the registry.
#[derive(Debug, Clone, Error)]
#[error("Unknown step '{step}'{}", .referenced_by.as_ref().map(|r| format!(" (referenced by '{r}')")).unwrap_or_default())]
pub struct UnknownStepError {
    /// The missing step id.
    pub step: String,
    /// The step whose dependency set names the missing id, if any.
    pub referenced_by: Option<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl UnknownStepError {
    /// Creates a new unknown step error for a direct lookup.
    #[must_use]
    pub fn new(step: impl Into<String>) -> Self {
        let step = step.into();
        let info = ContractErrorInfo::new(
            "REGISTRY-002-UNKNOWN",
            format!("Step '{step}' is not registered"),
        )
        .with_fix_hint("Check for typos in step names and register every dependency.");

        Self {
            step,
            referenced_by: None,
            error_info: info,
        }
    }

    /// Creates an unknown step error for a dangling dependency.
    #[must_use]
    pub fn referenced_by(step: impl Into<String>, dependent: impl Into<String>) -> Self {
        let dependent = dependent.into();
        let mut err = Self::new(step);
        err.error_info = err.error_info.with_context_entry("dependent", dependent.clone());
        err.referenced_by = Some(dependent);
        err
    }
}

/// Error raised when the dependency graph contains a cycle.
#[derive(Debug, Clone, Error)]
#[error("Cyclic dependency detected: {}", .cycle_path.join(" -> "))]
pub struct CyclicDependencyError {
    /// The path of steps forming the cycle; first and last entries are equal.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CyclicDependencyError {
    /// Creates a new cyclic dependency error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-001-CYCLE",
            format!("Step graph contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when a step reads the output of a step it did not declare.
#[derive(Debug, Clone, Error)]
#[error("Undeclared dependency: step '{step}' attempted to read '{dependency}' which was not declared as a dependency")]
pub struct UndeclaredDependencyError {
    /// The step attempting access.
    pub step: String,
    /// The undeclared dependency.
    pub dependency: String,
}

impl UndeclaredDependencyError {
    /// Creates a new undeclared dependency error.
    #[must_use]
    pub fn new(step: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            dependency: dependency.into(),
        }
    }
}

/// Failure returned by a step function.
///
/// Transient failures are retried according to the step's retry policy;
/// permanent failures end the step immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct StepError {
    /// Human readable error detail.
    pub message: String,
    /// Whether another attempt may succeed.
    pub retryable: bool,
}

impl StepError {
    /// Creates a transient (retryable) failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a permanent (non-retryable) failure.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<UndeclaredDependencyError> for StepError {
    fn from(err: UndeclaredDependencyError) -> Self {
        Self::permanent(err.to_string())
    }
}

/// Errors raised by the inbound data source.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never produced a response (DNS, connect, timeout).
    #[error("Request failed: {0}")]
    Transport(String),

    /// The upstream answered with a non-success status.
    #[error("Upstream returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response body was not a JSON document.
    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl FetchError {
    /// Returns true if retrying the request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl From<FetchError> for StepError {
    fn from(err: FetchError) -> Self {
        if err.is_transient() {
            Self::transient(err.to_string())
        } else {
            Self::permanent(err.to_string())
        }
    }
}

/// Errors raised by the outbound store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to establish a database connection.
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A statement failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// The store is temporarily unreachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded.
    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

impl StoreError {
    /// Returns true if retrying the statement may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed(_) | Self::Unavailable(_) => true,
            Self::QueryFailed(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            Self::InvalidRow(_) => false,
        }
    }
}

impl From<StoreError> for StepError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            Self::transient(err.to_string())
        } else {
            Self::permanent(err.to_string())
        }
    }
}

/// Errors raised while mapping an API payload onto a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The payload is not a JSON object.
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// The payload carries no date.
    #[error("Record has no date")]
    MissingDate,

    /// The date is not a calendar date.
    #[error("Invalid record date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
}

impl From<RecordError> for StepError {
    fn from(err: RecordError) -> Self {
        Self::permanent(err.to_string())
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, Error)]
#[error("Invalid configuration for '{field}': {message}")]
pub struct ConfigError {
    /// The offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}
