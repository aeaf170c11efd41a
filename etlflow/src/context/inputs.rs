//! Step inputs scoped to declared dependencies.

use crate::core::Payload;
use crate::errors::UndeclaredDependencyError;
use std::collections::{BTreeSet, HashMap};

static NULL: Payload = Payload::Null;

/// An immutable view of the run input and the outputs of a step's
/// declared dependencies.
///
/// Outputs of steps outside the dependency set are never stored here, so a
/// step cannot observe them even by accident.
#[derive(Debug, Clone, Default)]
pub struct StepInputs {
    /// The payload the run was started with.
    initial: Payload,
    /// Outputs of declared dependencies.
    outputs: HashMap<String, Payload>,
    /// The declared dependencies for this step.
    declared_dependencies: BTreeSet<String>,
    /// The name of the current step (for error messages).
    step_name: String,
}

impl StepInputs {
    /// Creates new step inputs, dropping any output that is not a declared
    /// dependency.
    #[must_use]
    pub fn new(
        step_name: impl Into<String>,
        initial: Payload,
        outputs: HashMap<String, Payload>,
        declared_dependencies: BTreeSet<String>,
    ) -> Self {
        let outputs = outputs
            .into_iter()
            .filter(|(name, _)| declared_dependencies.contains(name))
            .collect();

        Self {
            initial,
            outputs,
            declared_dependencies,
            step_name: step_name.into(),
        }
    }

    /// Creates inputs for a step without dependencies.
    #[must_use]
    pub fn root(step_name: impl Into<String>, initial: Payload) -> Self {
        Self::new(step_name, initial, HashMap::new(), BTreeSet::new())
    }

    /// Gets the output of a declared dependency.
    ///
    /// A declared dependency that produced nothing reads as `null`.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependencyError` if `dependency` is not declared.
    pub fn get(&self, dependency: &str) -> Result<&Payload, UndeclaredDependencyError> {
        if !self.declared_dependencies.contains(dependency) {
            return Err(UndeclaredDependencyError::new(&self.step_name, dependency));
        }
        Ok(self.outputs.get(dependency).unwrap_or(&NULL))
    }

    /// Returns the payload the run was started with.
    #[must_use]
    pub fn initial(&self) -> &Payload {
        &self.initial
    }

    /// Returns the name of the step these inputs belong to.
    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn declared_dependencies(&self) -> &BTreeSet<String> {
        &self.declared_dependencies
    }

    /// Returns the outputs keyed by dependency id.
    #[must_use]
    pub fn outputs(&self) -> &HashMap<String, Payload> {
        &self.outputs
    }
}
