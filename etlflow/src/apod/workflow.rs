//! Assembly of the APOD import graph.

use super::{ApodRecord, DailySchedule, FetchParams, Fetcher};
use crate::cancellation::CancellationToken;
use crate::context::StepInputs;
use crate::core::Payload;
use crate::errors::{DuplicateStepError, EtlflowError, StepError};
use crate::pipeline::{ExecutionPlan, Executor, GraphBuilder, RetryPolicy, Run};
use crate::registry::{StepRegistry, StepSpec};
use crate::steps::{Step, StepResult};
use crate::store::{IdempotentSink, TABLE_NAME};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

#[cfg(feature = "http")]
use super::{ApodConfig, HttpFetcher};
#[cfg(feature = "http")]
use crate::store::Database;

/// Creates the target table.
pub const CREATE_TABLE: &str = "create_table";
/// Fetches the raw record.
pub const EXTRACT: &str = "extract";
/// Maps the raw record onto an [`ApodRecord`].
pub const TRANSFORM: &str = "transform";
/// Upserts the record.
pub const LOAD: &str = "load";

/// Ensures the target table exists.
#[derive(Debug, Clone)]
pub struct CreateTableStep {
    sink: IdempotentSink,
}

impl CreateTableStep {
    /// Creates the step.
    #[must_use]
    pub fn new(sink: IdempotentSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Step for CreateTableStep {
    async fn run(&self, _inputs: &StepInputs) -> StepResult {
        self.sink.ensure_table().await?;
        Ok(json!({ "table": TABLE_NAME }))
    }
}

/// Fetches the raw APOD payload.
///
/// A `{"date": "YYYY-MM-DD"}` run input selects the day to import.
#[derive(Debug, Clone)]
pub struct ExtractStep {
    fetcher: Arc<dyn Fetcher>,
    params: FetchParams,
}

impl ExtractStep {
    /// Creates the step.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, params: FetchParams) -> Self {
        Self { fetcher, params }
    }

    fn params_for(&self, initial: &Payload) -> Result<FetchParams, StepError> {
        match initial.get("date").and_then(Payload::as_str) {
            Some(raw) => {
                let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                    StepError::permanent(format!("Invalid run date '{raw}': expected YYYY-MM-DD"))
                })?;
                Ok(self.params.clone().with_date(date))
            }
            None => Ok(self.params.clone()),
        }
    }
}

#[async_trait]
impl Step for ExtractStep {
    async fn run(&self, inputs: &StepInputs) -> StepResult {
        let params = self.params_for(inputs.initial())?;
        Ok(self.fetcher.fetch(&params).await?)
    }
}

/// Reshapes the extracted payload into the record schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformStep;

#[async_trait]
impl Step for TransformStep {
    async fn run(&self, inputs: &StepInputs) -> StepResult {
        let raw = inputs.get(EXTRACT)?;
        Ok(ApodRecord::from_payload(raw)?.to_payload())
    }
}

/// Upserts the transformed record.
#[derive(Debug, Clone)]
pub struct LoadStep {
    sink: IdempotentSink,
}

impl LoadStep {
    /// Creates the step.
    #[must_use]
    pub fn new(sink: IdempotentSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Step for LoadStep {
    async fn run(&self, inputs: &StepInputs) -> StepResult {
        let payload = inputs.get(TRANSFORM)?;
        let record: ApodRecord = serde_json::from_value(payload.clone())
            .map_err(|e| StepError::permanent(format!("Malformed record: {e}")))?;

        let affected = self.sink.upsert(&record).await?;
        Ok(json!({
            "affected_rows": affected,
            "fingerprint": record.fingerprint(),
        }))
    }
}

/// The daily APOD import.
#[derive(Debug, Clone)]
pub struct ApodWorkflow {
    fetcher: Arc<dyn Fetcher>,
    sink: IdempotentSink,
    params: FetchParams,
    retry: RetryPolicy,
}

impl ApodWorkflow {
    /// Creates a workflow with the default retry policy.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, sink: IdempotentSink, params: FetchParams) -> Self {
        Self {
            fetcher,
            sink,
            params,
            retry: RetryPolicy::default(),
        }
    }

    /// Builds the workflow from configuration, fetching over HTTP.
    #[cfg(feature = "http")]
    pub fn from_config(config: &ApodConfig, db: Arc<dyn Database>) -> Result<Self, EtlflowError> {
        config.validate()?;
        let fetcher = HttpFetcher::new(config)?;

        Ok(Self::new(
            Arc::new(fetcher),
            IdempotentSink::new(db),
            FetchParams::new(config.api_key.clone()),
        )
        .with_retry(config.retry.clone()))
    }

    /// Sets the retry policy of the I/O steps.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the sink.
    #[must_use]
    pub fn sink(&self) -> &IdempotentSink {
        &self.sink
    }

    /// Registers the four steps.
    ///
    /// The transform is pure, so it is never retried.
    pub fn registry(&self) -> Result<StepRegistry, DuplicateStepError> {
        let mut registry = StepRegistry::new();
        registry.register(
            StepSpec::new(CREATE_TABLE, Arc::new(CreateTableStep::new(self.sink.clone())))
                .with_retry(self.retry.clone()),
        )?;
        registry.register(
            StepSpec::new(
                EXTRACT,
                Arc::new(ExtractStep::new(Arc::clone(&self.fetcher), self.params.clone())),
            )
            .with_dependency(CREATE_TABLE)
            .with_retry(self.retry.clone()),
        )?;
        registry.register(
            StepSpec::new(TRANSFORM, Arc::new(TransformStep))
                .with_dependency(EXTRACT)
                .with_retry(RetryPolicy::no_retry()),
        )?;
        registry.register(
            StepSpec::new(LOAD, Arc::new(LoadStep::new(self.sink.clone())))
                .with_dependency(TRANSFORM)
                .with_retry(self.retry.clone()),
        )?;
        Ok(registry)
    }

    /// Validates and layers the graph.
    pub fn plan(&self) -> Result<ExecutionPlan, EtlflowError> {
        GraphBuilder::build(&self.registry()?)
    }

    /// Imports today's record.
    pub async fn run(&self, executor: &Executor) -> Result<Run, EtlflowError> {
        let plan = self.plan()?;
        Ok(executor.run(&plan, Payload::Null).await)
    }

    /// Imports the record of `date`.
    pub async fn run_for_date(
        &self,
        executor: &Executor,
        date: NaiveDate,
    ) -> Result<Run, EtlflowError> {
        let plan = self.plan()?;
        let input = json!({ "date": date.format("%Y-%m-%d").to_string() });
        Ok(executor.run(&plan, input).await)
    }

    /// Imports the record of each scheduled day until `token` is cancelled.
    ///
    /// A failed run is logged and the schedule keeps going. Returns the
    /// number of firings.
    pub async fn run_daily(
        &self,
        schedule: &DailySchedule,
        executor: &Executor,
        token: &CancellationToken,
    ) -> usize {
        schedule
            .run_until_cancelled(token, |scheduled| async move {
                match self.run_for_date(executor, scheduled.date_naive()).await {
                    Ok(run) => info!(
                        run_id = %run.id,
                        status = %run.status,
                        scheduled = %scheduled,
                        "Scheduled import finished"
                    ),
                    Err(e) => error!(
                        error = %e,
                        scheduled = %scheduled,
                        "Scheduled import did not start"
                    ),
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apod::ScheduleConfig;
    use crate::core::{RunStatus, StepStatus};
    use crate::events::CollectingEventSink;
    use crate::store::SqliteDatabase;
    use crate::testing::{
        assert_attempts, assert_run_status, assert_step_status, assert_step_succeeded,
        moon_payload, moon_record, FailingFetcher, FlakyFetcher, StaticFetcher,
    };
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    async fn sink() -> IdempotentSink {
        IdempotentSink::new(Arc::new(SqliteDatabase::in_memory().await.unwrap()))
    }

    fn workflow(fetcher: Arc<dyn Fetcher>, sink: IdempotentSink) -> ApodWorkflow {
        ApodWorkflow::new(fetcher, sink, FetchParams::new("test-key"))
            .with_retry(RetryPolicy::immediate(3))
    }

    #[tokio::test]
    async fn test_plan_is_a_chain() {
        let workflow = workflow(Arc::new(StaticFetcher::new(moon_payload())), sink().await);

        let plan = workflow.plan().unwrap();
        assert_eq!(plan.execution_order(), [CREATE_TABLE, EXTRACT, TRANSFORM, LOAD]);
        assert_eq!(plan.wave_count(), 4);
    }

    #[tokio::test]
    async fn test_end_to_end_moon_record() {
        let sink = sink().await;
        let fetcher = Arc::new(StaticFetcher::new(moon_payload()));
        let events = Arc::new(CollectingEventSink::new());
        let executor = Executor::default().with_event_sink(events.clone());

        let run = workflow(fetcher.clone(), sink.clone()).run(&executor).await.unwrap();

        assert_run_status(&run, RunStatus::Succeeded);
        for step in [CREATE_TABLE, EXTRACT, TRANSFORM, LOAD] {
            assert_step_succeeded(&run, step);
        }
        assert_eq!(events.len(), 4);

        let record = moon_record();
        assert_eq!(sink.count().await.unwrap(), 1);
        assert_eq!(sink.find(record.date, "image").await.unwrap(), Some(record.clone()));
        assert_eq!(
            run.output(LOAD).unwrap()["fingerprint"],
            json!(record.fingerprint())
        );
        assert_eq!(fetcher.calls(), vec![FetchParams::new("test-key")]);
    }

    #[tokio::test]
    async fn test_rerun_keeps_one_row() {
        let sink = sink().await;
        let workflow = workflow(Arc::new(StaticFetcher::new(moon_payload())), sink.clone());
        let executor = Executor::default();

        workflow.run(&executor).await.unwrap();
        let second = workflow.run(&executor).await.unwrap();

        assert!(second.is_success());
        let record = moon_record();
        assert_eq!(
            sink.count_by_natural_key(record.date, &record.media_type).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_failing_fetcher_skips_downstream() {
        let sink = sink().await;
        let fetcher = Arc::new(FailingFetcher::new());

        let run = workflow(fetcher.clone(), sink.clone())
            .run(&Executor::default())
            .await
            .unwrap();

        assert_run_status(&run, RunStatus::Failed);
        assert_step_succeeded(&run, CREATE_TABLE);
        assert_step_status(&run, EXTRACT, StepStatus::Failed);
        assert_step_status(&run, TRANSFORM, StepStatus::Skipped);
        assert_step_status(&run, LOAD, StepStatus::Skipped);
        assert_attempts(&run, EXTRACT, 3);
        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(sink.count().await.unwrap(), 0);

        let summary = run.summary();
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].error.contains("503"));
    }

    #[tokio::test]
    async fn test_transient_fetch_failure_recovers() {
        let sink = sink().await;
        let fetcher = Arc::new(FlakyFetcher::new(2, moon_payload()));

        let run = workflow(fetcher.clone(), sink.clone())
            .run(&Executor::default())
            .await
            .unwrap();

        assert!(run.is_success());
        assert_attempts(&run, EXTRACT, 3);
        assert_eq!(sink.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_payload_without_date_fails_transform_once() {
        let sink = sink().await;
        let fetcher = Arc::new(StaticFetcher::new(json!({"title": "No date"})));

        let run = workflow(fetcher, sink.clone())
            .run(&Executor::default())
            .await
            .unwrap();

        assert_step_status(&run, TRANSFORM, StepStatus::Failed);
        assert_attempts(&run, TRANSFORM, 1);
        assert_step_status(&run, LOAD, StepStatus::Skipped);
        assert_eq!(sink.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_for_date_forwards_date() {
        let sink = sink().await;
        let fetcher = Arc::new(StaticFetcher::new(moon_payload()));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let run = workflow(fetcher.clone(), sink)
            .run_for_date(&Executor::default(), date)
            .await
            .unwrap();

        assert!(run.is_success());
        assert_eq!(fetcher.calls()[0].date, Some(date));
    }

    #[tokio::test]
    async fn test_run_daily_imports_scheduled_date() {
        let fetcher = Arc::new(StaticFetcher::new(moon_payload()));
        let workflow = workflow(fetcher.clone(), sink().await);
        let scheduled = Utc::now() + chrono::Duration::milliseconds(300);
        let schedule = DailySchedule::new(ScheduleConfig {
            run_at: scheduled.time(),
        });
        let token = Arc::new(CancellationToken::new());
        let stopper = {
            let token = Arc::clone(&token);
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
                token.cancel("shutdown");
            })
        };

        let fired = workflow
            .run_daily(&schedule, &Executor::default(), &token)
            .await;
        stopper.await.unwrap();

        assert_eq!(fired, 1);
        assert_eq!(fetcher.calls().len(), 1);
        assert_eq!(fetcher.calls()[0].date, Some(scheduled.date_naive()));
        assert_eq!(workflow.sink().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_run_date_fails_extract() {
        let sink = sink().await;
        let fetcher = Arc::new(StaticFetcher::new(moon_payload()));
        let plan = workflow(fetcher.clone(), sink).plan().unwrap();

        let run = Executor::default()
            .run(&plan, json!({"date": "yesterday"}))
            .await;

        assert_step_status(&run, EXTRACT, StepStatus::Failed);
        assert_attempts(&run, EXTRACT, 1);
        assert!(fetcher.calls().is_empty());
    }
}
