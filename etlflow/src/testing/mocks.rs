//! Mock steps and fetchers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::apod::{FetchParams, Fetcher};
use crate::context::StepInputs;
use crate::core::Payload;
use crate::errors::{FetchError, StepError};
use crate::steps::{Step, StepResult};

/// A step that returns a fixed payload and counts its calls.
#[derive(Debug)]
pub struct StaticStep {
    output: Payload,
    delay: Duration,
    calls: AtomicUsize,
    seen: Mutex<Vec<StepInputs>>,
}

impl StaticStep {
    /// Creates a step returning `output`.
    #[must_use]
    pub fn new(output: Payload) -> Self {
        Self {
            output,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Makes every call sleep for `delay` first.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns the number of times the step was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the inputs of every call.
    #[must_use]
    pub fn recorded_inputs(&self) -> Vec<StepInputs> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Step for StaticStep {
    async fn run(&self, inputs: &StepInputs) -> StepResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(inputs.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.output.clone())
    }
}

/// A step that always fails.
#[derive(Debug)]
pub struct FailingStep {
    error: StepError,
    calls: AtomicUsize,
}

impl FailingStep {
    /// Creates a step failing with a transient error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            error: StepError::transient(message),
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates a step failing with a permanent error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            error: StepError::permanent(message),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times the step was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for FailingStep {
    async fn run(&self, _inputs: &StepInputs) -> StepResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// A step that fails transiently a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyStep {
    failures: usize,
    output: Payload,
    calls: AtomicUsize,
}

impl FlakyStep {
    /// Creates a step that fails `failures` times before returning `output`.
    #[must_use]
    pub fn new(failures: usize, output: Payload) -> Self {
        Self {
            failures,
            output,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times the step was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for FlakyStep {
    async fn run(&self, _inputs: &StepInputs) -> StepResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(StepError::transient(format!("transient failure {call}")));
        }
        Ok(self.output.clone())
    }
}

/// A fetcher that returns a fixed payload.
#[derive(Debug)]
pub struct StaticFetcher {
    payload: Payload,
    calls: Mutex<Vec<FetchParams>>,
}

impl StaticFetcher {
    /// Creates a fetcher returning `payload`.
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the parameters of every call.
    #[must_use]
    pub fn calls(&self) -> Vec<FetchParams> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, params: &FetchParams) -> Result<Payload, FetchError> {
        self.calls.lock().push(params.clone());
        Ok(self.payload.clone())
    }
}

/// A fetcher that always fails with a server error.
#[derive(Debug, Default)]
pub struct FailingFetcher {
    calls: AtomicUsize,
}

impl FailingFetcher {
    /// Creates a failing fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of times the fetcher was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FailingFetcher {
    async fn fetch(&self, _params: &FetchParams) -> Result<Payload, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Status {
            status: 503,
            body: "service unavailable".to_string(),
        })
    }
}

/// A fetcher that fails with a transport error a fixed number of times.
#[derive(Debug)]
pub struct FlakyFetcher {
    failures: usize,
    payload: Payload,
    calls: AtomicUsize,
}

impl FlakyFetcher {
    /// Creates a fetcher that fails `failures` times before returning `payload`.
    #[must_use]
    pub fn new(failures: usize, payload: Payload) -> Self {
        Self {
            failures,
            payload,
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times the fetcher was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FlakyFetcher {
    async fn fetch(&self, _params: &FetchParams) -> Result<Payload, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(FetchError::Transport("connection reset".to_string()));
        }
        Ok(self.payload.clone())
    }
}
