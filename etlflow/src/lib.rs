//! # etlflow
//!
//! A small dependency-ordered ETL step scheduler with an idempotent SQL sink,
//! plus the daily NASA Astronomy Picture of the Day import built on it.
//!
//! - **Step registry**: named steps with declared dependencies and retry policies
//! - **Graph builder**: validation and layering into concurrent waves
//! - **Executor**: bounded concurrency, retries, skip propagation, cancellation
//! - **Idempotent sink**: upserts keyed on a natural key through sqlx
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use etlflow::prelude::*;
//!
//! let db = SqliteDatabase::connect(Path::new("apod.db")).await?;
//! let workflow = ApodWorkflow::from_config(&ApodConfig::from_env(), Arc::new(db))?;
//!
//! let run = workflow.run(&Executor::default()).await?;
//! println!("{:?}", run.summary());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod apod;
pub mod cancellation;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod registry;
pub mod steps;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::apod::{ApodConfig, ApodRecord, ApodWorkflow, DailySchedule, FetchParams, Fetcher};
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::StepInputs;
    pub use crate::core::{Payload, RunStatus, StepEvent, StepStatus};
    pub use crate::errors::{
        ContractErrorInfo, CyclicDependencyError, DuplicateStepError, EtlflowError, StepError,
        UnknownStepError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{
        ExecutionPlan, Executor, ExecutorConfig, GraphBuilder, RetryPolicy, Run, RunSummary,
    };
    pub use crate::registry::{StepRegistry, StepSpec};
    pub use crate::steps::{AsyncFnStep, FnStep, Step, StepResult};
    pub use crate::store::{Database, IdempotentSink, PostgresDatabase, SqliteDatabase};
}
