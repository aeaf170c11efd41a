//! Step specifications.

use crate::pipeline::RetryPolicy;
use crate::steps::Step;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Specification for a single step in a graph.
#[derive(Debug, Clone)]
pub struct StepSpec {
    /// The unique identifier of the step.
    pub name: String,
    /// The step implementation.
    pub runner: Arc<dyn Step>,
    /// Identifiers of steps this step depends on.
    pub dependencies: BTreeSet<String>,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl StepSpec {
    /// Creates a new step specification with the default retry policy.
    #[must_use]
    pub fn new(name: impl Into<String>, runner: Arc<dyn Step>) -> Self {
        Self {
            name: name.into(),
            runner,
            dependencies: BTreeSet::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.insert(dep.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
