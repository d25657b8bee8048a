//! Job definitions — what the scheduler fires and what it reports.

use std::future::Future;
use std::sync::Arc;

use actionbot_core::error::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;

/// Scheduler-assigned job identifier (`job-<n>`).
pub type JobId = String;

/// Async callback invoked on every fire. Errors are logged by the scheduler.
pub type JobCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure into a [`JobCallback`].
pub fn job_callback<F, Fut>(f: F) -> JobCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// Snapshot of a registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    /// The expression as registered.
    pub schedule: String,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
}
