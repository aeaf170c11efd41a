//! Wave-based step executor.
//!
//! Waves run strictly in sequence. Steps inside a wave run as spawned tasks,
//! bounded by a semaphore sized from [`ExecutorConfig::max_concurrency`].

use super::{ExecutionPlan, RetryDecision, Run, StepRecord, AttemptRecord};
use crate::cancellation::CancellationToken;
use crate::context::StepInputs;
use crate::core::{Payload, StepEvent, StepStatus};
use crate::events::{EventSink, NoOpEventSink};
use crate::registry::StepSpec;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

fn default_max_concurrency() -> usize {
    4
}

/// Executor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum number of steps of one wave running at the same time.
    /// Zero is treated as one.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl ExecutorConfig {
    /// Sets the concurrency bound.
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }
}

/// Runs execution plans.
#[derive(Clone)]
pub struct Executor {
    config: ExecutorConfig,
    events: Arc<dyn EventSink>,
    cancellation: Arc<CancellationToken>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

impl Executor {
    /// Creates an executor that discards events.
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            events: Arc::new(NoOpEventSink),
            cancellation: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Uses a shared cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the cancellation token observed by this executor.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancellation)
    }

    /// Executes `plan` with `initial_input` and returns the finished run.
    ///
    /// Step failures never abort the run: dependents of a step that did not
    /// succeed are skipped, independent branches keep going.
    pub async fn run(&self, plan: &ExecutionPlan, initial_input: Payload) -> Run {
        let mut run = Run::start(plan);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        info!(
            run_id = %run.id,
            steps = plan.step_count(),
            waves = plan.wave_count(),
            "Run started"
        );

        for wave in plan.waves() {
            let mut active = FuturesUnordered::new();

            for id in wave {
                let Some(spec) = plan.step(id) else {
                    continue;
                };

                if self.cancellation.is_cancelled() {
                    let record =
                        StepRecord::not_run(id, StepStatus::Cancelled, cancel_reason(&self.cancellation));
                    self.finalize(&mut run, record).await;
                    continue;
                }

                let blocked_by = spec
                    .dependencies
                    .iter()
                    .find(|dep| !run.step_status(dep).is_some_and(|s| s.is_success()));
                if let Some(dep) = blocked_by {
                    let record = StepRecord::not_run(
                        id,
                        StepStatus::Skipped,
                        format!("dependency '{dep}' did not succeed"),
                    );
                    self.finalize(&mut run, record).await;
                    continue;
                }

                let outputs: HashMap<String, Payload> = spec
                    .dependencies
                    .iter()
                    .filter_map(|dep| run.output(dep).map(|out| (dep.clone(), out.clone())))
                    .collect();
                let inputs = StepInputs::new(
                    id.clone(),
                    initial_input.clone(),
                    outputs,
                    spec.dependencies.clone(),
                );

                run.mark_running(id);
                let handle = tokio::spawn(execute_step(
                    spec.clone(),
                    inputs,
                    Arc::clone(&semaphore),
                    Arc::clone(&self.cancellation),
                ));
                let id = id.clone();
                active.push(async move { (id, handle.await) });
            }

            while let Some((id, joined)) = active.next().await {
                let record = match joined {
                    Ok(record) => record,
                    Err(e) => StepRecord {
                        status: StepStatus::Failed,
                        error: Some(format!("Step task crashed: {e}")),
                        ..StepRecord::pending(id)
                    },
                };
                self.finalize(&mut run, record).await;
            }
        }

        run.finish();

        let summary = run.summary();
        info!(
            run_id = %run.id,
            status = %run.status,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "Run finished"
        );

        run
    }

    /// Logs and emits the outcome of one step, then stores it on the run.
    async fn finalize(&self, run: &mut Run, record: StepRecord) {
        let mut event = StepEvent::new(
            run.id,
            &record.step,
            record.status,
            record.duration_ms,
            record.attempt_count(),
        );
        if let Some(detail) = record.detail() {
            event = event.with_error(detail);
        }

        match record.status {
            StepStatus::Succeeded => info!(
                run_id = %run.id,
                step = %record.step,
                attempts = record.attempt_count(),
                duration_ms = record.duration_ms,
                "Step succeeded"
            ),
            status => warn!(
                run_id = %run.id,
                step = %record.step,
                status = %status,
                attempts = record.attempt_count(),
                detail = record.detail().unwrap_or_default(),
                "Step did not succeed"
            ),
        }

        self.events.emit(&event).await;
        run.record(record);
    }
}

fn cancel_reason(token: &CancellationToken) -> String {
    token
        .reason()
        .map_or_else(|| "run cancelled".to_string(), |r| format!("run cancelled: {r}"))
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Runs one step to a final record, retrying per its policy.
async fn execute_step(
    spec: StepSpec,
    inputs: StepInputs,
    semaphore: Arc<Semaphore>,
    token: Arc<CancellationToken>,
) -> StepRecord {
    let mut record = StepRecord::pending(&spec.name);

    let Ok(_permit) = semaphore.acquire_owned().await else {
        record.status = StepStatus::Failed;
        record.error = Some("Worker pool closed".to_string());
        return record;
    };

    // Cancellation raised while queued for a permit still counts as not started.
    if token.is_cancelled() {
        return StepRecord::not_run(spec.name, StepStatus::Cancelled, cancel_reason(&token));
    }

    let started = Instant::now();
    record.status = StepStatus::Running;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let attempt_start = Instant::now();
        let result = spec.runner.run(&inputs).await;
        let duration_ms = elapsed_ms(attempt_start);

        let error = match result {
            Ok(output) => {
                record.attempts.push(AttemptRecord {
                    attempt,
                    duration_ms,
                    error: None,
                });
                record.status = StepStatus::Succeeded;
                record.output = Some(output);
                record.error = None;
                break;
            }
            Err(error) => error,
        };

        record.attempts.push(AttemptRecord {
            attempt,
            duration_ms,
            error: Some(error.message.clone()),
        });
        record.error = Some(error.message.clone());

        match spec.retry.decide(attempt, &error) {
            RetryDecision::Retry(delay) => {
                debug!(
                    step = %spec.name,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "Retrying step after backoff"
                );
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        debug!(step = %spec.name, attempt, "Retry abandoned, run cancelled");
                        record.status = StepStatus::Failed;
                        break;
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
            RetryDecision::GiveUp | RetryDecision::NotRetryable => {
                record.status = StepStatus::Failed;
                break;
            }
        }
    }

    record.duration_ms = elapsed_ms(started);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunStatus;
    use crate::events::CollectingEventSink;
    use crate::pipeline::{GraphBuilder, RetryPolicy};
    use crate::registry::StepRegistry;
    use crate::steps::{AsyncFnStep, FnStep, Step, StepResult};
    use crate::testing::{
        assert_attempts, assert_run_status, assert_step_status, assert_step_succeeded,
        FailingStep, FlakyStep, StaticStep,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn spec(name: &str, step: Arc<dyn Step>, deps: &[&str]) -> StepSpec {
        StepSpec::new(name, step)
            .with_dependencies(deps.iter().copied())
            .with_retry(RetryPolicy::immediate(3))
    }

    fn plan(specs: Vec<StepSpec>) -> ExecutionPlan {
        let mut registry = StepRegistry::new();
        for spec in specs {
            registry.register(spec).unwrap();
        }
        GraphBuilder::build(&registry).unwrap()
    }

    #[tokio::test]
    async fn test_outputs_flow_to_dependents() {
        let double = FnStep::new("double", |inputs: &StepInputs| {
            let n = inputs.get("source")?.as_i64().unwrap_or_default();
            Ok(json!(n * 2))
        });
        let plan = plan(vec![
            spec("source", Arc::new(StaticStep::new(json!(21))), &[]),
            spec("double", Arc::new(double), &["source"]),
        ]);

        let run = Executor::default().run(&plan, Payload::Null).await;

        assert_run_status(&run, RunStatus::Succeeded);
        assert_eq!(run.output("double"), Some(&json!(42)));
        assert_attempts(&run, "double", 1);
    }

    #[tokio::test]
    async fn test_initial_input_reaches_every_step() {
        let echo = AsyncFnStep::new("echo", |inputs: StepInputs| async move {
            Ok(inputs.initial().clone())
        });
        let plan = plan(vec![spec("echo", Arc::new(echo), &[])]);

        let run = Executor::default().run(&plan, json!({"date": "2024-01-01"})).await;

        assert_eq!(run.output("echo"), Some(&json!({"date": "2024-01-01"})));
    }

    #[tokio::test]
    async fn test_undeclared_outputs_are_invisible() {
        let recorder = Arc::new(StaticStep::new(json!(null)));
        let plan = plan(vec![
            spec("a", Arc::new(StaticStep::new(json!("a"))), &[]),
            spec("b", Arc::new(StaticStep::new(json!("b"))), &["a"]),
            spec("c", recorder.clone(), &["b"]),
        ]);

        Executor::default().run(&plan, Payload::Null).await;

        let inputs = recorder.recorded_inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].get("b").unwrap(), &json!("b"));
        assert!(inputs[0].get("a").is_err());
        assert!(!inputs[0].outputs().contains_key("a"));
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let flaky = Arc::new(FlakyStep::new(2, json!("ok")));
        let plan = plan(vec![spec("flaky", flaky.clone(), &[])]);

        let run = Executor::default().run(&plan, Payload::Null).await;

        assert_step_succeeded(&run, "flaky");
        assert_attempts(&run, "flaky", 3);
        assert_eq!(flaky.call_count(), 3);

        let record = run.step("flaky").unwrap();
        assert!(record.attempts[0].error.is_some());
        assert!(record.attempts[2].error.is_none());
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_always_failing_step_uses_every_attempt() {
        let failing = Arc::new(FailingStep::transient("upstream timeout"));
        let plan = plan(vec![
            StepSpec::new("extract", failing.clone()).with_retry(RetryPolicy::immediate(4)),
        ]);

        let run = Executor::default().run(&plan, Payload::Null).await;

        assert_step_status(&run, "extract", StepStatus::Failed);
        assert_attempts(&run, "extract", 4);
        assert_eq!(failing.call_count(), 4);
        assert_eq!(
            run.step("extract").unwrap().error.as_deref(),
            Some("upstream timeout")
        );
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let failing = Arc::new(FailingStep::permanent("bad request"));
        let plan = plan(vec![spec("extract", failing.clone(), &[])]);

        let run = Executor::default().run(&plan, Payload::Null).await;

        assert_step_status(&run, "extract", StepStatus::Failed);
        assert_eq!(failing.call_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_skips_dependents_only() {
        let dependent = Arc::new(StaticStep::new(json!("b")));
        let plan = plan(vec![
            spec("a", Arc::new(FailingStep::permanent("boom")), &[]),
            spec("b", dependent.clone(), &["a"]),
            spec("d", Arc::new(StaticStep::new(json!("d"))), &["b"]),
            spec("c", Arc::new(StaticStep::new(json!("c"))), &[]),
        ]);

        let run = Executor::default().run(&plan, Payload::Null).await;

        assert_run_status(&run, RunStatus::Failed);
        assert_step_status(&run, "a", StepStatus::Failed);
        assert_step_status(&run, "b", StepStatus::Skipped);
        assert_step_status(&run, "d", StepStatus::Skipped);
        assert_step_succeeded(&run, "c");
        assert_eq!(dependent.call_count(), 0);
        assert_eq!(
            run.step("b").unwrap().reason.as_deref(),
            Some("dependency 'a' did not succeed")
        );

        let summary = run.summary();
        assert!(summary.is_partial_success());
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].step, "a");
    }

    #[tokio::test]
    async fn test_cancel_before_run() {
        let first = Arc::new(StaticStep::new(json!(1)));
        let second = Arc::new(StaticStep::new(json!(2)));
        let plan = plan(vec![
            spec("first", first.clone(), &[]),
            spec("second", second.clone(), &["first"]),
        ]);

        let executor = Executor::default();
        executor.cancellation_token().cancel("shutdown");
        let run = executor.run(&plan, Payload::Null).await;

        assert_run_status(&run, RunStatus::Cancelled);
        assert_step_status(&run, "first", StepStatus::Cancelled);
        assert_step_status(&run, "second", StepStatus::Cancelled);
        assert_eq!(first.call_count() + second.call_count(), 0);
        assert_eq!(
            run.step("first").unwrap().reason.as_deref(),
            Some("run cancelled: shutdown")
        );
    }

    #[tokio::test]
    async fn test_cancel_during_wave_lets_running_step_finish() {
        let token = Arc::new(CancellationToken::new());
        let canceller = {
            let token = Arc::clone(&token);
            AsyncFnStep::new("canceller", move |_inputs: StepInputs| {
                let token = Arc::clone(&token);
                async move {
                    token.cancel("operator request");
                    Ok(json!("done"))
                }
            })
        };
        let later = Arc::new(StaticStep::new(json!("later")));
        let plan = plan(vec![
            spec("canceller", Arc::new(canceller), &[]),
            spec("later", later.clone(), &["canceller"]),
        ]);

        let run = Executor::default()
            .with_cancellation(token)
            .run(&plan, Payload::Null)
            .await;

        assert_step_succeeded(&run, "canceller");
        assert_step_status(&run, "later", StepStatus::Cancelled);
        assert_eq!(later.call_count(), 0);
        assert_run_status(&run, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_ends_step_failed() {
        let failing = Arc::new(FailingStep::transient("timeout"));
        let plan = plan(vec![StepSpec::new("slow_retry", failing.clone()).with_retry(
            RetryPolicy::new()
                .with_max_attempts(5)
                .with_base_delay_ms(60_000)
                .with_max_delay_ms(60_000),
        )]);

        let executor = Executor::default();
        let token = executor.cancellation_token();
        let handle = tokio::spawn(async move { executor.run(&plan, Payload::Null).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel("deadline");

        let run = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run should stop after cancellation")
            .unwrap();

        assert_step_status(&run, "slow_retry", StepStatus::Failed);
        assert_eq!(failing.call_count(), 1);
        assert_eq!(run.step("slow_retry").unwrap().error.as_deref(), Some("timeout"));
    }

    #[derive(Debug, Default)]
    struct ConcurrencyGauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Step for ConcurrencyGauge {
        async fn run(&self, _inputs: &StepInputs) -> StepResult {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(Payload::Null)
        }
    }

    #[tokio::test]
    async fn test_wave_respects_concurrency_bound() {
        let gauge = Arc::new(ConcurrencyGauge::default());
        let specs = (0..8)
            .map(|i| spec(&format!("step_{i}"), gauge.clone(), &[]))
            .collect();
        let plan = plan(specs);

        let run = Executor::new(ExecutorConfig::default().with_max_concurrency(2))
            .run(&plan, Payload::Null)
            .await;

        assert!(run.is_success());
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency was {peak}");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_duration_excludes_time_queued_for_a_worker() {
        let sink = Arc::new(CollectingEventSink::new());
        let delayed =
            || Arc::new(StaticStep::new(json!(1)).with_delay(Duration::from_millis(150)));
        let plan = plan(vec![
            spec("a", delayed(), &[]),
            spec("b", delayed(), &[]),
            spec("c", delayed(), &[]),
        ]);

        let run = Executor::new(ExecutorConfig::default().with_max_concurrency(1))
            .with_event_sink(sink.clone())
            .run(&plan, Payload::Null)
            .await;

        assert!(run.is_success());
        for name in ["a", "b", "c"] {
            let record = run.step(name).unwrap();
            let attempt_ms: f64 = record.attempts.iter().map(|a| a.duration_ms).sum();
            assert!(attempt_ms >= 140.0, "{name} attempt took {attempt_ms}ms");
            assert!(
                record.duration_ms < attempt_ms + 75.0,
                "{name} duration {}ms includes queue wait (attempts {attempt_ms}ms)",
                record.duration_ms
            );
            let event = &sink.events_for(name)[0];
            assert_eq!(event.duration_ms, record.duration_ms);
        }
    }

    #[tokio::test]
    async fn test_one_event_per_step() {
        let sink = Arc::new(CollectingEventSink::new());
        let plan = plan(vec![
            spec("a", Arc::new(FlakyStep::new(1, json!(1))), &[]),
            spec("b", Arc::new(FailingStep::permanent("nope")), &["a"]),
            spec("c", Arc::new(StaticStep::new(json!(3))), &["b"]),
        ]);

        let run = Executor::default()
            .with_event_sink(sink.clone())
            .run(&plan, Payload::Null)
            .await;

        assert_eq!(sink.len(), 3);
        let types: Vec<String> = sink.events().into_iter().map(|e| e.event_type).collect();
        assert_eq!(types, ["step.succeeded", "step.failed", "step.skipped"]);

        let a = &sink.events_for("a")[0];
        assert_eq!(a.run_id, run.id);
        assert_eq!(a.attempts, 2);
        assert_eq!(sink.events_for("b")[0].error.as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let run = Executor::default()
            .run(&ExecutionPlan::default(), Payload::Null)
            .await;
        assert!(run.is_success());
        assert_eq!(run.summary().total, 0);
    }

    #[test]
    fn test_executor_config_defaults() {
        let config: ExecutorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_concurrency, 4);
    }
}
