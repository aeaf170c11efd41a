//! Daily trigger.

use crate::cancellation::CancellationToken;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::info;

fn default_run_at() -> NaiveTime {
    NaiveTime::default()
}

/// When the daily job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Time of day (UTC).
    #[serde(default = "default_run_at")]
    pub run_at: NaiveTime,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_at: default_run_at(),
        }
    }
}

/// Fires a job once per UTC day until cancelled.
///
/// Missed days are never caught up: after a late or long run the next
/// firing is simply the next occurrence of `run_at`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailySchedule {
    config: ScheduleConfig,
}

impl DailySchedule {
    /// Creates a schedule.
    #[must_use]
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    /// Returns the first firing strictly after `now`.
    #[must_use]
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive().and_time(self.config.run_at).and_utc();
        if today > now {
            today
        } else {
            today + ChronoDuration::days(1)
        }
    }

    /// Runs `job` at every firing until `token` is cancelled.
    ///
    /// The job receives its scheduled time. A job in progress is awaited to
    /// completion. Returns the number of completed firings.
    pub async fn run_until_cancelled<F, Fut>(&self, token: &CancellationToken, mut job: F) -> usize
    where
        F: FnMut(DateTime<Utc>) -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut fired = 0;

        loop {
            let now = Utc::now();
            let next = self.next_run_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next_run = %next, "Waiting for next scheduled run");

            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = tokio::time::sleep(wait) => {
                    job(next).await;
                    fired += 1;
                }
            }
        }

        info!(fired, "Schedule stopped");
        fired
    }
}
