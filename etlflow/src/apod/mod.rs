//! The daily Astronomy Picture of the Day import.
//!
//! Four steps wired as `create_table -> extract -> transform -> load`:
//! the target table is created, today's record is fetched from the APOD API,
//! reshaped into an [`ApodRecord`] and upserted on `(date, media_type)`.

mod config;
mod fetch;
mod record;
mod schedule;
mod workflow;

pub use config::{ApodConfig, API_KEY_ENV, BASE_URL_ENV, DEMO_KEY};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::{FetchParams, Fetcher};
pub use record::ApodRecord;
pub use schedule::{DailySchedule, ScheduleConfig};
pub use workflow::{
    ApodWorkflow, CreateTableStep, ExtractStep, LoadStep, TransformStep, CREATE_TABLE, EXTRACT,
    LOAD, TRANSFORM,
};
