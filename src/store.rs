//! Durable persistence of scheduled jobs and run records.
//!
//! The trait is object-safe and async-compatible via boxed futures rather
//! than `async_trait`: trait objects can't have native `async fn` methods.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{CreateScheduledJob, JobRun, JobRunStats, RunStatus, ScheduledJob, ScheduledJobPatch};

pub mod sqlite;

pub use sqlite::SqliteStore;

/// A boxed, `Send` future — the `dyn`-compatible stand-in for `async fn` in
/// a trait.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable store for `ScheduledJob` and `JobRun` rows.
///
/// All operations are atomic; failures surface as `Error::StoreError`.
pub trait Store: Send + Sync {
    fn create_scheduled_job(&self, job: CreateScheduledJob) -> BoxFuture<'_, Result<ScheduledJob>>;

    fn list_scheduled_jobs(&self) -> BoxFuture<'_, Result<Vec<ScheduledJob>>>;

    fn list_active_scheduled_jobs(&self) -> BoxFuture<'_, Result<Vec<ScheduledJob>>>;

    fn get_scheduled_job(&self, id: &str) -> BoxFuture<'_, Result<Option<ScheduledJob>>>;

    fn update_scheduled_job(
        &self,
        id: &str,
        patch: ScheduledJobPatch,
    ) -> BoxFuture<'_, Result<ScheduledJob>>;

    fn delete_scheduled_job(&self, id: &str) -> BoxFuture<'_, Result<()>>;

    fn update_last_run_time(
        &self,
        id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<()>>;

    fn create_job_run(&self, run: JobRun) -> BoxFuture<'_, Result<JobRun>>;

    fn update_job_run(&self, id: &str, patch: JobRunPatch) -> BoxFuture<'_, Result<JobRun>>;

    fn list_job_runs(&self, scheduled_job_id: &str, limit: i64) -> BoxFuture<'_, Result<Vec<JobRun>>>;

    fn get_job_run(&self, id: &str) -> BoxFuture<'_, Result<Option<JobRun>>>;

    fn list_running_runs(&self) -> BoxFuture<'_, Result<Vec<JobRun>>>;

    fn cleanup_old_job_runs(&self, retention_days: u32) -> BoxFuture<'_, Result<u64>>;

    fn job_run_stats(&self, scheduled_job_id: Option<&str>) -> BoxFuture<'_, Result<JobRunStats>>;
}

/// Partial update applied to a `JobRun` on status transition.
#[derive(Debug, Clone, Default)]
pub struct JobRunPatch {
    pub status: Option<RunStatus>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<i64>,
}

impl JobRunPatch {
    pub fn completed(result_data: serde_json::Value, execution_time_ms: i64) -> Self {
        Self {
            status: Some(RunStatus::Completed),
            completed_at: Some(Utc::now()),
            result_data: Some(result_data),
            error_message: None,
            execution_time_ms: Some(execution_time_ms),
        }
    }

    pub fn failed(error_message: impl Into<String>, execution_time_ms: i64) -> Self {
        Self {
            status: Some(RunStatus::Failed),
            completed_at: Some(Utc::now()),
            result_data: None,
            error_message: Some(error_message.into()),
            execution_time_ms: Some(execution_time_ms),
        }
    }
}
