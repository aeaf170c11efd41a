//! Dependency graph validation and wave layering.
//!
//! A wave is a set of steps with no ordering relation between them whose
//! dependencies all live in earlier waves.

use crate::errors::{CyclicDependencyError, EtlflowError, UnknownStepError};
use crate::registry::{StepRegistry, StepSpec};
use std::collections::{HashMap, HashSet};

/// A validated graph, layered into waves.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// Step specifications by identifier.
    steps: HashMap<String, StepSpec>,
    /// Waves in execution order; each wave keeps registration order.
    waves: Vec<Vec<String>>,
}

impl ExecutionPlan {
    /// Returns the waves in execution order.
    #[must_use]
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Returns the number of waves.
    #[must_use]
    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Gets a step specification.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&StepSpec> {
        self.steps.get(id)
    }

    /// Returns the index of the wave holding `id`.
    #[must_use]
    pub fn wave_of(&self, id: &str) -> Option<usize> {
        self.waves.iter().position(|wave| wave.iter().any(|s| s == id))
    }

    /// Returns every step identifier in execution order.
    #[must_use]
    pub fn execution_order(&self) -> Vec<&str> {
        self.waves.iter().flatten().map(String::as_str).collect()
    }
}

/// Builds [`ExecutionPlan`]s from a registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    /// Validates the registry and layers it into waves.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStepError` if a dependency is not registered and
    /// `CyclicDependencyError` if the graph has a cycle (self-dependencies
    /// included). No partial ordering is ever returned.
    pub fn build(registry: &StepRegistry) -> Result<ExecutionPlan, EtlflowError> {
        for spec in registry.iter() {
            if let Some(dep) = spec.dependencies.iter().find(|d| !registry.contains(d)) {
                return Err(UnknownStepError::referenced_by(dep, &spec.name).into());
            }
        }

        let mut placed: HashSet<&str> = HashSet::with_capacity(registry.len());
        let mut remaining: Vec<&StepSpec> = registry.iter().collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<&StepSpec>, Vec<&StepSpec>) = remaining
                .into_iter()
                .partition(|spec| spec.dependencies.iter().all(|d| placed.contains(d.as_str())));

            if ready.is_empty() {
                return Err(find_cycle(&blocked).into());
            }

            placed.extend(ready.iter().map(|spec| spec.name.as_str()));
            waves.push(ready.iter().map(|spec| spec.name.clone()).collect());
            remaining = blocked;
        }

        let steps = registry
            .iter()
            .map(|spec| (spec.name.clone(), spec.clone()))
            .collect();

        tracing::debug!(
            steps = registry.len(),
            waves = waves.len(),
            "Step graph planned"
        );

        Ok(ExecutionPlan { steps, waves })
    }
}

/// Walks dependency edges among `blocked` steps until a step repeats.
///
/// Every blocked step has at least one dependency that is itself blocked,
/// so the walk always closes a cycle.
fn find_cycle(blocked: &[&StepSpec]) -> CyclicDependencyError {
    let by_name: HashMap<&str, &StepSpec> =
        blocked.iter().map(|spec| (spec.name.as_str(), *spec)).collect();

    let mut path: Vec<String> = Vec::new();
    let mut current = blocked.first().copied();

    while let Some(spec) = current {
        if let Some(start) = path.iter().position(|n| n == &spec.name) {
            let mut cycle = path[start..].to_vec();
            cycle.push(spec.name.clone());
            return CyclicDependencyError::new(cycle);
        }
        path.push(spec.name.clone());
        current = spec
            .dependencies
            .iter()
            .find_map(|d| by_name.get(d.as_str()).copied());
    }

    CyclicDependencyError::new(path)
}
