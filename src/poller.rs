//! Bounded, cancellable wait for asynchronous provider jobs.
//!
//! ```text
//! fetch ──► completed? ──yes──► Ok(JobStatus)
//!              │ no
//!              ▼
//!     elapsed > max_wait? ──yes──► Err(Timeout)
//!              │ no
//!              ▼
//!     sleep(interval) ◄──── cancel ──► Err(Cancelled)
//!              │
//!              └──► fetch
//! ```
//!
//! Fetch errors end the wait immediately; retrying a fetch is the caller's
//! business.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// Poll cadence and deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_wait: Duration::from_millis(120_000),
        }
    }
}

impl PollOptions {
    /// Apply per-call overrides in milliseconds.
    ///
    /// A `max_wait_ms` of 0 means a single fetch followed by `Timeout` when
    /// the job is still pending. An `interval_ms` of 0 counts as absent so a
    /// caller cannot turn the wait into a busy loop against the provider.
    pub fn with_overrides(self, interval_ms: Option<u64>, max_wait_ms: Option<u64>) -> Self {
        Self {
            interval: interval_ms
                .filter(|ms| *ms > 0)
                .map_or(self.interval, Duration::from_millis),
            max_wait: max_wait_ms.map_or(self.max_wait, Duration::from_millis),
        }
    }
}

/// One observation of a job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub completed: bool,
    /// Provider response, untouched.
    pub body: Value,
}

impl JobStatus {
    /// Completion from a `Completed` (or `completed`) boolean.
    pub fn from_provider_body(job_id: impl Into<String>, body: Value) -> Self {
        let completed = ["Completed", "completed"]
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_bool))
            .unwrap_or(false);
        Self {
            job_id: job_id.into(),
            completed,
            body,
        }
    }

    /// Completion from a `Data.Status` string; `success` and `fail` are final.
    pub fn from_status_body(job_id: impl Into<String>, body: Value) -> Self {
        let status = body
            .get("Data")
            .or_else(|| body.get("data"))
            .and_then(|data| data.get("Status").or_else(|| data.get("status")))
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase);
        Self {
            job_id: job_id.into(),
            completed: matches!(status.as_deref(), Some("success" | "fail")),
            body,
        }
    }
}

/// Poll `fetch` until it reports completion, `max_wait` elapses or `cancel`
/// fires.
///
/// The deadline is checked after each fetch, so a wait overshoots `max_wait`
/// by at most one `interval` plus one fetch.
///
/// # Errors
///
/// - `Timeout { job_id }` once `max_wait` has elapsed without completion
/// - `Cancelled { job_id }` when `cancel` fires during a sleep
/// - any error returned by `fetch`, unchanged
pub async fn wait_for<F, Fut>(
    job_id: &str,
    mut fetch: F,
    options: PollOptions,
    cancel: &CancellationToken,
) -> AppResult<JobStatus>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<JobStatus>>,
{
    let started = Instant::now();
    let mut polls: u32 = 0;

    loop {
        let status = match fetch().await {
            Ok(status) => status,
            Err(e) => {
                crate::metrics::record_job_poll("error");
                warn!(job_id, polls, error = %e, "Job status fetch failed");
                return Err(e);
            }
        };
        polls += 1;

        if status.completed {
            crate::metrics::record_job_poll("completed");
            info!(
                job_id,
                polls,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job completed"
            );
            return Ok(status);
        }

        if started.elapsed() > options.max_wait {
            crate::metrics::record_job_poll("timeout");
            warn!(job_id, polls, "Gave up waiting for job");
            return Err(AppError::Timeout {
                job_id: job_id.to_string(),
            });
        }

        debug!(job_id, polls, "Job pending");
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                crate::metrics::record_job_poll("cancelled");
                info!(job_id, polls, "Stopped waiting for job");
                return Err(AppError::Cancelled {
                    job_id: job_id.to_string(),
                });
            }
            _ = sleep(options.interval) => {}
        }
    }
}
