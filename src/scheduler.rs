//! Process-wide scheduler lifecycle.
//!
//! A `Clone`-able handle wrapping `tokio_cron_scheduler::JobScheduler` and a
//! job-id -> dispatcher UUID map guarded by `tokio::sync::RwLock`. Two
//! things are built fresh here: a per-job single-flight lock map (the
//! "Executing" state a job occupies between tick and terminal write), and
//! a single `perform_run` routine shared by scheduled ticks and manual
//! fire, so the two paths can't drift apart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{JobRun, RunStatus, RunType, ScheduledJob};
use crate::recurrence;
use crate::runner::Runner;
use crate::store::{JobRunPatch, Store};

/// Snapshot returned by `Status()`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub count: usize,
    pub ids: Vec<String>,
}

struct Inner {
    store: Arc<dyn Store>,
    runner: Arc<dyn Runner>,
    dispatcher: JobScheduler,
    /// Maps `ScheduledJob::id` -> dispatcher job UUID.
    job_map: RwLock<HashMap<String, Uuid>>,
    /// Per-schedule-id single-flight lock. Both scheduled ticks and manual
    /// fire acquire the same lock domain (see DESIGN.md).
    execution_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    shutdown: CancellationToken,
    cleanup_cron: String,
    retention_days: u32,
    running: std::sync::atomic::AtomicBool,
}

/// `Clone`-able handle to the process-wide scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<Inner>,
}

impl SchedulerHandle {
    pub async fn new(
        store: Arc<dyn Store>,
        runner: Arc<dyn Runner>,
        cleanup_cron: String,
        retention_days: u32,
    ) -> Result<Self> {
        let dispatcher = JobScheduler::new()
            .await
            .map_err(|e| Error::StoreError(format!("failed to start job dispatcher: {e}")))?;
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                runner,
                dispatcher,
                job_map: RwLock::new(HashMap::new()),
                execution_locks: RwLock::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                cleanup_cron,
                retention_days,
                running: std::sync::atomic::AtomicBool::new(false),
            }),
        })
    }

    /// Idempotent. Reads active jobs from the store, registers each, and
    /// registers the internal cleanup cron.
    pub async fn start(&self) -> Result<()> {
        use std::sync::atomic::Ordering;
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner
            .dispatcher
            .start()
            .await
            .map_err(|e| Error::StoreError(format!("failed to start dispatcher: {e}")))?;

        let jobs = self.inner.store.list_active_scheduled_jobs().await?;
        for job in jobs {
            if let Err(e) = self.register(&job).await {
                tracing::error!(job_id = %job.id, error = %e, "failed to register job at startup");
            }
        }

        self.register_cleanup_job().await?;
        tracing::info!("scheduler started");
        Ok(())
    }

    /// Unregisters every job and the cleanup task, cancels in-flight
    /// executions, and waits for them to finish or abort, bounded by
    /// `shutdown_timeout`.
    pub async fn stop(&self, shutdown_timeout: Duration) -> Result<()> {
        use std::sync::atomic::Ordering;
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.shutdown.cancel();

        let ids: Vec<String> = self.inner.job_map.read().await.keys().cloned().collect();
        for id in ids {
            self.unschedule(&id).await?;
        }

        let mut dispatcher = self.inner.dispatcher.clone();
        let _ = tokio::time::timeout(shutdown_timeout, dispatcher.shutdown()).await;
        tracing::info!("scheduler stopped");
        Ok(())
    }

    /// Unregisters any prior handle for `job.id`, computes its cron
    /// expression, registers a fresh handle, and persists `next_run_at`.
    pub async fn schedule_job(&self, job: &ScheduledJob) -> Result<()> {
        self.unschedule(&job.id).await?;
        self.register(job).await
    }

    /// Removes the dispatcher handle for `id`, if present. Idempotent.
    pub async fn unschedule_job(&self, id: &str) -> Result<()> {
        self.unschedule(id).await
    }

    /// Looks up the job (must be active), creates a `manual` run, and
    /// executes it inline under the same single-flight rules as a
    /// scheduled tick. Recomputes `next_run_at` afterward without
    /// disturbing the scheduled cadence.
    pub async fn execute_job_manually(&self, id: &str) -> Result<JobRun> {
        let job = self
            .inner
            .store
            .get_scheduled_job(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("scheduled job '{id}' not found")))?;
        if !job.is_active {
            return Err(Error::Validation(format!(
                "scheduled job '{id}' is not active"
            )));
        }
        self.perform_run(job, RunType::Manual).await
    }

    /// Equivalent to unregistering every job handle (cleanup preserved),
    /// followed by a fresh load from the store.
    pub async fn reload(&self) -> Result<()> {
        let ids: Vec<String> = self.inner.job_map.read().await.keys().cloned().collect();
        for id in ids {
            self.unschedule(&id).await?;
        }
        let jobs = self.inner.store.list_active_scheduled_jobs().await?;
        for job in jobs {
            if let Err(e) = self.register(&job).await {
                tracing::error!(job_id = %job.id, error = %e, "failed to register job on reload");
            }
        }
        Ok(())
    }

    pub async fn status(&self) -> SchedulerStatus {
        use std::sync::atomic::Ordering;
        let map = self.inner.job_map.read().await;
        SchedulerStatus {
            running: self.inner.running.load(Ordering::SeqCst),
            count: map.len(),
            ids: map.keys().cloned().collect(),
        }
    }

    // ========================================================================
    // Internal
    // ========================================================================

    async fn register(&self, job: &ScheduledJob) -> Result<()> {
        if !job.is_active {
            return Ok(());
        }
        let cron_expr = recurrence::build_cron_spec(job.schedule_type, &job.schedule_config)?;
        let next_run_at = recurrence::next_fire_after(&cron_expr, &job.timezone, chrono::Utc::now())?;
        self.inner
            .store
            .update_last_run_time(&job.id, job.last_run_at.unwrap_or(job.created_at), next_run_at)
            .await?;

        let six_field = format!("0 {cron_expr}");
        let job_id = job.id.clone();
        let handle = self.clone();
        let dispatcher_job = Job::new_async(six_field.as_str(), move |_uuid, _lock| {
            let handle = handle.clone();
            let job_id = job_id.clone();
            Box::pin(async move {
                handle.on_tick(&job_id).await;
            })
        })
        .map_err(|e| Error::ScheduleConfigInvalid(format!("invalid cron expression: {e}")))?;

        let uuid = self
            .inner
            .dispatcher
            .add(dispatcher_job)
            .await
            .map_err(|e| Error::StoreError(format!("failed to register job: {e}")))?;

        self.inner.job_map.write().await.insert(job.id.clone(), uuid);
        tracing::info!(job_id = %job.id, %uuid, "job registered");
        Ok(())
    }

    async fn unschedule(&self, id: &str) -> Result<()> {
        let uuid = self.inner.job_map.write().await.remove(id);
        if let Some(uuid) = uuid {
            self.inner
                .dispatcher
                .remove(&uuid)
                .await
                .map_err(|e| Error::StoreError(format!("failed to unregister job: {e}")))?;
            tracing::info!(job_id = %id, "job unregistered");
        }
        Ok(())
    }

    async fn register_cleanup_job(&self) -> Result<()> {
        let store = Arc::clone(&self.inner.store);
        let retention_days = self.inner.retention_days;
        let six_field = format!("0 {}", self.inner.cleanup_cron);
        let cleanup_job = Job::new_async(six_field.as_str(), move |_uuid, _lock| {
            let store = Arc::clone(&store);
            Box::pin(async move {
                match store.cleanup_old_job_runs(retention_days).await {
                    Ok(n) => tracing::info!(deleted = n, "cleaned up old job runs"),
                    Err(e) => tracing::error!(error = %e, "cleanup sweep failed"),
                }
            })
        })
        .map_err(|e| Error::ScheduleConfigInvalid(format!("invalid cleanup cron: {e}")))?;

        self.inner
            .dispatcher
            .add(cleanup_job)
            .await
            .map_err(|e| Error::StoreError(format!("failed to register cleanup job: {e}")))?;
        Ok(())
    }

    /// Called by the dispatcher when a job's cron fires. Re-reads the job,
    /// checks single-flight, and runs it. Never surfaces an error past this
    /// point — every outcome is logged and persisted as a terminal JobRun.
    async fn on_tick(&self, job_id: &str) {
        let job = match self.inner.store.get_scheduled_job(job_id).await {
            Ok(Some(job)) if job.is_active => job,
            Ok(_) => {
                tracing::warn!(job_id, "tick fired for missing/inactive job, unregistering");
                let _ = self.unschedule(job_id).await;
                return;
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "failed to re-read job on tick");
                return;
            }
        };

        let lock = self.execution_lock(job_id).await;
        let guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(job_id, "tick dropped: a run is already in flight for this job");
                return;
            }
        };

        if let Err(e) = self.perform_run(job, RunType::Scheduled).await {
            tracing::error!(job_id, error = %e, "scheduled run failed to complete");
        }
        drop(guard);
    }

    async fn execution_lock(&self, job_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.execution_locks.write().await;
        locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The run procedure shared by scheduled ticks and manual execution:
    /// create the `running` row, invoke the runner, persist terminal
    /// state and duration, then recompute and persist `next_run_at`.
    async fn perform_run(&self, job: ScheduledJob, run_type: RunType) -> Result<JobRun> {
        // Manual fire acquires the same single-flight lock as a scheduled
        // tick — one lock domain for both (see DESIGN.md).
        let lock = self.execution_lock(&job.id).await;
        let _guard = if run_type == RunType::Manual {
            Some(lock.lock().await)
        } else {
            None
        };

        let run_id = Uuid::new_v4().to_string();
        let started_at = chrono::Utc::now();
        let run = JobRun {
            id: run_id.clone(),
            scheduled_job_id: job.id.clone(),
            run_type,
            status: RunStatus::Running,
            started_at,
            completed_at: None,
            result_data: None,
            error_message: None,
            execution_time_ms: None,
        };
        self.inner.store.create_job_run(run).await?;

        let clock = Instant::now();
        let cancel = self.inner.shutdown.child_token();
        let outcome = self.inner.runner.execute(&job, cancel).await;
        let elapsed_ms = clock.elapsed().as_millis() as i64;

        let patch = match &outcome {
            Ok(data) => JobRunPatch::completed(data.clone(), elapsed_ms),
            Err(e) => JobRunPatch::failed(e.to_string(), elapsed_ms),
        };
        let run = self.inner.store.update_job_run(&run_id, patch).await?;

        // next_run_at anchors on the nominal fire instant (`started_at`),
        // not completion time, so a long-running job doesn't drift its
        // own cadence later (see DESIGN.md).
        let cron_expr = recurrence::build_cron_spec(job.schedule_type, &job.schedule_config)?;
        let next_run_at = recurrence::next_fire_after(&cron_expr, &job.timezone, started_at)?;
        self.inner
            .store
            .update_last_run_time(&job.id, started_at, next_run_at)
            .await?;

        Ok(run)
    }
}

/// Marks every orphaned `running` JobRun as `failed` with
/// `error_message = "interrupted by restart"`. Run once at startup, before
/// `SchedulerHandle::start` registers any job, so it is independently
/// testable.
pub async fn recover_orphaned_runs(store: &dyn Store) -> Result<usize> {
    let orphans = store.list_running_runs().await?;
    let count = orphans.len();
    for run in orphans {
        let patch = JobRunPatch {
            status: Some(RunStatus::Failed),
            completed_at: Some(chrono::Utc::now()),
            error_message: Some(Error::InterruptedByRestart.to_string()),
            ..Default::default()
        };
        if let Err(e) = store.update_job_run(&run.id, patch).await {
            tracing::error!(run_id = %run.id, error = %e, "failed to reconcile orphaned run");
        }
    }
    if count > 0 {
        tracing::warn!(count, "reconciled orphaned runs from a prior process");
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CreateScheduledJob, JobType, ScheduleType};
    use crate::store::sqlite::SqliteStore;
    use serde_json::{json, Value};

    struct AlwaysSucceeds;

    impl Runner for AlwaysSucceeds {
        fn execute<'a>(
            &'a self,
            _job: &'a ScheduledJob,
            _cancellation: CancellationToken,
        ) -> crate::store::BoxFuture<'a, Result<Value>> {
            Box::pin(async move { Ok(json!({"ok": true})) })
        }
    }

    struct AlwaysFails;

    impl Runner for AlwaysFails {
        fn execute<'a>(
            &'a self,
            _job: &'a ScheduledJob,
            _cancellation: CancellationToken,
        ) -> crate::store::BoxFuture<'a, Result<Value>> {
            Box::pin(async move { Err(Error::RemoteError("blocked".to_string())) })
        }
    }

    /// Counts invocations and sleeps long enough for a concurrent tick to
    /// observe the single-flight lock as held.
    struct SlowCounting {
        invocations: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Runner for SlowCounting {
        fn execute<'a>(
            &'a self,
            _job: &'a ScheduledJob,
            _cancellation: CancellationToken,
        ) -> crate::store::BoxFuture<'a, Result<Value>> {
            let invocations = self.invocations.clone();
            Box::pin(async move {
                invocations.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(json!({"ok": true}))
            })
        }
    }

    async fn setup(runner: Arc<dyn Runner>) -> (SchedulerHandle, Arc<SqliteStore>, ScheduledJob) {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let job = store
            .create_scheduled_job(CreateScheduledJob {
                name: "test".into(),
                job_type: JobType::Scrape,
                job_config: json!({}),
                url: Some("https://example.com".into()),
                urls: None,
                api_endpoint: "https://api.example.com".into(),
                schedule_type: ScheduleType::Hourly,
                schedule_config: json!({}),
                timezone: "UTC".into(),
                is_active: true,
            })
            .await
            .unwrap();

        let scheduler = SchedulerHandle::new(store.clone(), runner, "0 2 * * *".into(), 30)
            .await
            .unwrap();
        (scheduler, store, job)
    }

    #[tokio::test]
    async fn manual_run_completes_and_advances_next_run_at() {
        let (scheduler, store, job) = setup(Arc::new(AlwaysSucceeds)).await;
        let run = scheduler.execute_job_manually(&job.id).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.run_type, RunType::Manual);

        let updated = store.get_scheduled_job(&job.id).await.unwrap().unwrap();
        assert!(updated.last_run_at.is_some());
        assert!(updated.next_run_at > job.next_run_at || updated.last_run_at.is_some());
    }

    #[tokio::test]
    async fn manual_run_of_failing_job_records_failure() {
        let (scheduler, _store, job) = setup(Arc::new(AlwaysFails)).await;
        let run = scheduler.execute_job_manually(&job.id).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.unwrap().contains("blocked"));
    }

    #[tokio::test]
    async fn manual_run_of_inactive_job_is_rejected() {
        let (scheduler, store, job) = setup(Arc::new(AlwaysSucceeds)).await;
        store
            .update_scheduled_job(
                &job.id,
                crate::model::ScheduledJobPatch {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = scheduler.execute_job_manually(&job.id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn status_reports_zero_before_start() {
        let (scheduler, _store, _job) = setup(Arc::new(AlwaysSucceeds)).await;
        let status = scheduler.status().await;
        assert!(!status.running);
        assert_eq!(status.count, 0);
    }

    #[tokio::test]
    async fn concurrent_ticks_for_same_job_are_single_flight() {
        let invocations = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let runner = Arc::new(SlowCounting {
            invocations: invocations.clone(),
        });
        let (scheduler, store, job) = setup(runner).await;

        let first = scheduler.clone();
        let first_id = job.id.clone();
        let second = scheduler.clone();
        let second_id = job.id.clone();

        tokio::join!(
            async move { first.on_tick(&first_id).await },
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                second.on_tick(&second_id).await
            }
        );

        assert_eq!(invocations.load(std::sync::atomic::Ordering::SeqCst), 1);
        let runs = store.list_job_runs(&job.id, 10).await.unwrap();
        assert_eq!(runs.len(), 1);
    }

    #[tokio::test]
    async fn recover_orphaned_runs_marks_interrupted() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let job = store
            .create_scheduled_job(CreateScheduledJob {
                name: "test".into(),
                job_type: JobType::Scrape,
                job_config: json!({}),
                url: Some("https://example.com".into()),
                urls: None,
                api_endpoint: "https://api.example.com".into(),
                schedule_type: ScheduleType::Hourly,
                schedule_config: json!({}),
                timezone: "UTC".into(),
                is_active: true,
            })
            .await
            .unwrap();

        let orphan = JobRun {
            id: Uuid::new_v4().to_string(),
            scheduled_job_id: job.id.clone(),
            run_type: RunType::Scheduled,
            status: RunStatus::Running,
            started_at: chrono::Utc::now(),
            completed_at: None,
            result_data: None,
            error_message: None,
            execution_time_ms: None,
        };
        store.create_job_run(orphan.clone()).await.unwrap();

        let count = recover_orphaned_runs(&store).await.unwrap();
        assert_eq!(count, 1);

        let reconciled = store.get_job_run(&orphan.id).await.unwrap().unwrap();
        assert_eq!(reconciled.status, RunStatus::Failed);
        assert_eq!(reconciled.error_message.as_deref(), Some("interrupted by restart"));
    }
}
