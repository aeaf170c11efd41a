//! Step registry.
//!
//! Holds step definitions in registration order. The registry is plain data:
//! validation of the dependency graph happens in
//! [`GraphBuilder`](crate::pipeline::GraphBuilder).

mod spec;

pub use spec::StepSpec;

use crate::errors::{DuplicateStepError, UnknownStepError};
use crate::steps::Step;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of step specifications keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    /// Registered steps.
    steps: HashMap<String, StepSpec>,
    /// Registration order, for deterministic planning.
    order: Vec<String>,
}

impl StepRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a step.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateStepError` if the identifier is already registered.
    pub fn register(&mut self, spec: StepSpec) -> Result<(), DuplicateStepError> {
        if self.steps.contains_key(&spec.name) {
            return Err(DuplicateStepError::new(&spec.name));
        }
        self.order.push(spec.name.clone());
        self.steps.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Registers a step from its parts, builder style.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateStepError` if the identifier is already registered.
    pub fn step(
        mut self,
        name: impl Into<String>,
        runner: Arc<dyn Step>,
        dependencies: &[&str],
    ) -> Result<Self, DuplicateStepError> {
        let spec = StepSpec::new(name, runner).with_dependencies(dependencies.iter().copied());
        self.register(spec)?;
        Ok(self)
    }

    /// Gets a step by identifier.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStepError` if the identifier is not registered.
    pub fn get(&self, id: &str) -> Result<&StepSpec, UnknownStepError> {
        self.steps.get(id).ok_or_else(|| UnknownStepError::new(id))
    }

    /// Returns true if the identifier is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.steps.contains_key(id)
    }

    /// Returns the identifiers in registration order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Iterates over the specifications in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &StepSpec> {
        self.order.iter().filter_map(|id| self.steps.get(id))
    }

    /// Returns the number of registered steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no step is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
