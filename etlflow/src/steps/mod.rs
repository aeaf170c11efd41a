//! Step trait and function adapters.
//!
//! Steps are the fundamental units of work in an etlflow graph.

use crate::context::StepInputs;
use crate::core::Payload;
use crate::errors::StepError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// The result of one step attempt.
pub type StepResult = Result<Payload, StepError>;

/// Trait for graph steps.
///
/// A step maps the outputs of its declared dependencies to an output payload.
/// The executor may call `run` more than once when the step fails with a
/// retryable error, so side effects must tolerate repetition.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Executes one attempt of the step.
    async fn run(&self, inputs: &StepInputs) -> StepResult;
}

/// A synchronous function-based step.
pub struct FnStep<F>
where
    F: Fn(&StepInputs) -> StepResult + Send + Sync,
{
    label: String,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&StepInputs) -> StepResult + Send + Sync,
{
    /// Creates a new function-based step.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
        }
    }
}

impl<F> Debug for FnStep<F>
where
    F: Fn(&StepInputs) -> StepResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("label", &self.label).finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&StepInputs) -> StepResult + Send + Sync,
{
    async fn run(&self, inputs: &StepInputs) -> StepResult {
        (self.func)(inputs)
    }
}

/// An async function-based step.
///
/// The closure receives an owned copy of the inputs so the returned future
/// does not borrow from the executor.
pub struct AsyncFnStep<F, Fut>
where
    F: Fn(StepInputs) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send,
{
    label: String,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnStep<F, Fut>
where
    F: Fn(StepInputs) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send,
{
    /// Creates a new async function-based step.
    pub fn new(label: impl Into<String>, func: F) -> Self {
        Self {
            label: label.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for AsyncFnStep<F, Fut>
where
    F: Fn(StepInputs) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFnStep").field("label", &self.label).finish()
    }
}

#[async_trait]
impl<F, Fut> Step for AsyncFnStep<F, Fut>
where
    F: Fn(StepInputs) -> Fut + Send + Sync,
    Fut: Future<Output = StepResult> + Send,
{
    async fn run(&self, inputs: &StepInputs) -> StepResult {
        (self.func)(inputs.clone()).await
    }
}

/// A step that succeeds with `null` and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStep;

#[async_trait]
impl Step for NoOpStep {
    async fn run(&self, _inputs: &StepInputs) -> StepResult {
        Ok(Payload::Null)
    }
}
