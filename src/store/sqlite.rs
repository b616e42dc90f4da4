//! SQLite-backed implementation of [`Store`].
//!
//! Uses `sqlx` with WAL mode for concurrent readers, across two tables
//! (`scheduled_jobs`, `job_runs`), with `PRAGMA foreign_keys = ON` so a
//! `ScheduledJob` delete cascades to its `JobRun` rows at the database
//! level rather than in application code.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{
    CreateScheduledJob, JobRun, JobRunStats, JobType, RunStatus, RunType, ScheduleType, ScheduledJob,
    ScheduledJobPatch,
};
use crate::recurrence;
use crate::store::{BoxFuture, JobRunPatch, Store};

/// SQLite-backed `Store`.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens or creates a SQLite database with WAL mode enabled.
    pub async fn open(path: impl AsRef<Path>, busy_timeout_ms: u64) -> Result<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::StoreError(e.to_string()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite:{}",
            path_ref.to_string_lossy()
        ))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_millis(busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Opens an in-memory database (for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_jobs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                job_type TEXT NOT NULL,
                job_config TEXT NOT NULL,
                url TEXT,
                urls TEXT,
                api_endpoint TEXT NOT NULL,
                schedule_type TEXT NOT NULL,
                schedule_config TEXT NOT NULL,
                timezone TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_run_at TEXT,
                next_run_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS job_runs (
                id TEXT PRIMARY KEY,
                scheduled_job_id TEXT NOT NULL REFERENCES scheduled_jobs(id) ON DELETE CASCADE,
                run_type TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                result_data TEXT,
                error_message TEXT,
                execution_time_ms INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_job_runs_scheduled_job_id ON job_runs(scheduled_job_id, started_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_runs_status ON job_runs(status)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_is_active ON scheduled_jobs(is_active)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct ScheduledJobRow {
    id: String,
    name: String,
    job_type: String,
    job_config: String,
    url: Option<String>,
    urls: Option<String>,
    api_endpoint: String,
    schedule_type: String,
    schedule_config: String,
    timezone: String,
    is_active: i64,
    created_at: String,
    updated_at: String,
    last_run_at: Option<String>,
    next_run_at: String,
}

impl TryFrom<ScheduledJobRow> for ScheduledJob {
    type Error = Error;

    fn try_from(row: ScheduledJobRow) -> Result<Self> {
        Ok(ScheduledJob {
            id: row.id,
            name: row.name,
            job_type: row.job_type.parse::<JobType>()?,
            job_config: serde_json::from_str(&row.job_config)?,
            url: row.url,
            urls: row.urls.map(|s| serde_json::from_str(&s)).transpose()?,
            api_endpoint: row.api_endpoint,
            schedule_type: row.schedule_type.parse::<ScheduleType>()?,
            schedule_config: serde_json::from_str(&row.schedule_config)?,
            timezone: row.timezone,
            is_active: row.is_active != 0,
            created_at: parse_rfc3339(&row.created_at)?,
            updated_at: parse_rfc3339(&row.updated_at)?,
            last_run_at: row.last_run_at.as_deref().map(parse_rfc3339).transpose()?,
            next_run_at: parse_rfc3339(&row.next_run_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRunRow {
    id: String,
    scheduled_job_id: String,
    run_type: String,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    result_data: Option<String>,
    error_message: Option<String>,
    execution_time_ms: Option<i64>,
}

impl TryFrom<JobRunRow> for JobRun {
    type Error = Error;

    fn try_from(row: JobRunRow) -> Result<Self> {
        Ok(JobRun {
            id: row.id,
            scheduled_job_id: row.scheduled_job_id,
            run_type: row.run_type.parse::<RunType>()?,
            status: row.status.parse::<RunStatus>()?,
            started_at: parse_rfc3339(&row.started_at)?,
            completed_at: row.completed_at.as_deref().map(parse_rfc3339).transpose()?,
            result_data: row.result_data.map(|s| serde_json::from_str(&s)).transpose()?,
            error_message: row.error_message,
            execution_time_ms: row.execution_time_ms,
        })
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::StoreError(format!("invalid timestamp '{s}': {e}")))
}

// ============================================================================
// Store impl
// ============================================================================

impl Store for SqliteStore {
    fn create_scheduled_job(&self, job: CreateScheduledJob) -> BoxFuture<'_, Result<ScheduledJob>> {
        Box::pin(async move {
            let cron_expr = recurrence::build_cron_spec(job.schedule_type, &job.schedule_config)?;
            let now = Utc::now();
            let next_run_at = recurrence::next_fire_after(&cron_expr, &job.timezone, now)?;

            let row = ScheduledJob {
                id: Uuid::new_v4().to_string(),
                name: job.name,
                job_type: job.job_type,
                job_config: job.job_config,
                url: job.url,
                urls: job.urls,
                api_endpoint: job.api_endpoint,
                schedule_type: job.schedule_type,
                schedule_config: job.schedule_config,
                timezone: job.timezone,
                is_active: job.is_active,
                created_at: now,
                updated_at: now,
                last_run_at: None,
                next_run_at,
            };
            row.validate_target()?;

            sqlx::query(
                r#"
                INSERT INTO scheduled_jobs
                    (id, name, job_type, job_config, url, urls, api_endpoint, schedule_type,
                     schedule_config, timezone, is_active, created_at, updated_at, last_run_at, next_run_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.name)
            .bind(row.job_type.to_string())
            .bind(serde_json::to_string(&row.job_config)?)
            .bind(&row.url)
            .bind(row.urls.as_ref().map(serde_json::to_string).transpose()?)
            .bind(&row.api_endpoint)
            .bind(row.schedule_type.to_string())
            .bind(serde_json::to_string(&row.schedule_config)?)
            .bind(&row.timezone)
            .bind(row.is_active as i64)
            .bind(row.created_at.to_rfc3339())
            .bind(row.updated_at.to_rfc3339())
            .bind(row.last_run_at.map(|d| d.to_rfc3339()))
            .bind(row.next_run_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

            Ok(row)
        })
    }

    fn list_scheduled_jobs(&self) -> BoxFuture<'_, Result<Vec<ScheduledJob>>> {
        Box::pin(async move {
            let rows: Vec<ScheduledJobRow> =
                sqlx::query_as("SELECT * FROM scheduled_jobs ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?;
            rows.into_iter().map(ScheduledJob::try_from).collect()
        })
    }

    fn list_active_scheduled_jobs(&self) -> BoxFuture<'_, Result<Vec<ScheduledJob>>> {
        Box::pin(async move {
            let rows: Vec<ScheduledJobRow> = sqlx::query_as(
                "SELECT * FROM scheduled_jobs WHERE is_active = 1 ORDER BY created_at DESC",
            )
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(ScheduledJob::try_from).collect()
        })
    }

    fn get_scheduled_job(&self, id: &str) -> BoxFuture<'_, Result<Option<ScheduledJob>>> {
        let id = id.to_string();
        Box::pin(async move {
            let row: Option<ScheduledJobRow> =
                sqlx::query_as("SELECT * FROM scheduled_jobs WHERE id = ?")
                    .bind(&id)
                    .fetch_optional(&self.pool)
                    .await?;
            row.map(ScheduledJob::try_from).transpose()
        })
    }

    fn update_scheduled_job(
        &self,
        id: &str,
        patch: ScheduledJobPatch,
    ) -> BoxFuture<'_, Result<ScheduledJob>> {
        let id = id.to_string();
        Box::pin(async move {
            let existing = self
                .get_scheduled_job(&id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("scheduled job '{id}' not found")))?;

            let merged = ScheduledJob {
                name: patch.name.unwrap_or(existing.name),
                job_type: patch.job_type.unwrap_or(existing.job_type),
                job_config: patch.job_config.unwrap_or(existing.job_config),
                url: patch.url.unwrap_or(existing.url),
                urls: patch.urls.unwrap_or(existing.urls),
                api_endpoint: patch.api_endpoint.unwrap_or(existing.api_endpoint),
                schedule_type: patch.schedule_type.unwrap_or(existing.schedule_type),
                schedule_config: patch.schedule_config.unwrap_or(existing.schedule_config),
                timezone: patch.timezone.unwrap_or(existing.timezone),
                is_active: patch.is_active.unwrap_or(existing.is_active),
                updated_at: Utc::now(),
                ..existing
            };
            merged.validate_target()?;

            // Pause semantics: a job flipped to `is_active = false` is left with
            // its existing `next_run_at` untouched until it is re-activated — it
            // is an advisory value, not a live cron registration, and recomputing
            // it on every edit of a paused job would make it drift from what was
            // last true while the job was actually scheduled.
            let merged = if merged.is_active {
                let cron_expr =
                    recurrence::build_cron_spec(merged.schedule_type, &merged.schedule_config)?;
                let next_run_at =
                    recurrence::next_fire_after(&cron_expr, &merged.timezone, merged.updated_at)?;
                ScheduledJob {
                    next_run_at,
                    ..merged
                }
            } else {
                merged
            };

            sqlx::query(
                r#"
                UPDATE scheduled_jobs SET
                    name = ?, job_type = ?, job_config = ?, url = ?, urls = ?, api_endpoint = ?,
                    schedule_type = ?, schedule_config = ?, timezone = ?, is_active = ?,
                    updated_at = ?, next_run_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&merged.name)
            .bind(merged.job_type.to_string())
            .bind(serde_json::to_string(&merged.job_config)?)
            .bind(&merged.url)
            .bind(merged.urls.as_ref().map(serde_json::to_string).transpose()?)
            .bind(&merged.api_endpoint)
            .bind(merged.schedule_type.to_string())
            .bind(serde_json::to_string(&merged.schedule_config)?)
            .bind(&merged.timezone)
            .bind(merged.is_active as i64)
            .bind(merged.updated_at.to_rfc3339())
            .bind(merged.next_run_at.to_rfc3339())
            .bind(&merged.id)
            .execute(&self.pool)
            .await?;

            Ok(merged)
        })
    }

    fn delete_scheduled_job(&self, id: &str) -> BoxFuture<'_, Result<()>> {
        let id = id.to_string();
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM scheduled_jobs WHERE id = ?")
                .bind(&id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(Error::NotFound(format!("scheduled job '{id}' not found")));
            }
            Ok(())
        })
    }

    fn update_last_run_time(
        &self,
        id: &str,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<()>> {
        let id = id.to_string();
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE scheduled_jobs SET last_run_at = ?, next_run_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(last_run_at.to_rfc3339())
            .bind(next_run_at.to_rfc3339())
            .bind(Utc::now().to_rfc3339())
            .bind(&id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(Error::NotFound(format!("scheduled job '{id}' not found")));
            }
            Ok(())
        })
    }

    fn create_job_run(&self, run: JobRun) -> BoxFuture<'_, Result<JobRun>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO job_runs
                    (id, scheduled_job_id, run_type, status, started_at, completed_at,
                     result_data, error_message, execution_time_ms)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&run.id)
            .bind(&run.scheduled_job_id)
            .bind(run.run_type.to_string())
            .bind(run.status.to_string())
            .bind(run.started_at.to_rfc3339())
            .bind(run.completed_at.map(|d| d.to_rfc3339()))
            .bind(run.result_data.as_ref().map(serde_json::to_string).transpose()?)
            .bind(&run.error_message)
            .bind(run.execution_time_ms)
            .execute(&self.pool)
            .await?;
            Ok(run)
        })
    }

    fn update_job_run(&self, id: &str, patch: JobRunPatch) -> BoxFuture<'_, Result<JobRun>> {
        let id = id.to_string();
        Box::pin(async move {
            let existing = self
                .get_job_run(&id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("job run '{id}' not found")))?;

            let merged = JobRun {
                status: patch.status.unwrap_or(existing.status),
                completed_at: patch.completed_at.or(existing.completed_at),
                result_data: patch.result_data.or(existing.result_data),
                error_message: patch.error_message.or(existing.error_message),
                execution_time_ms: patch.execution_time_ms.or(existing.execution_time_ms),
                ..existing
            };

            sqlx::query(
                r#"
                UPDATE job_runs SET
                    status = ?, completed_at = ?, result_data = ?, error_message = ?, execution_time_ms = ?
                WHERE id = ?
                "#,
            )
            .bind(merged.status.to_string())
            .bind(merged.completed_at.map(|d| d.to_rfc3339()))
            .bind(merged.result_data.as_ref().map(serde_json::to_string).transpose()?)
            .bind(&merged.error_message)
            .bind(merged.execution_time_ms)
            .bind(&merged.id)
            .execute(&self.pool)
            .await?;

            Ok(merged)
        })
    }

    fn list_job_runs(&self, scheduled_job_id: &str, limit: i64) -> BoxFuture<'_, Result<Vec<JobRun>>> {
        let scheduled_job_id = scheduled_job_id.to_string();
        Box::pin(async move {
            let rows: Vec<JobRunRow> = sqlx::query_as(
                "SELECT * FROM job_runs WHERE scheduled_job_id = ? ORDER BY started_at DESC LIMIT ?",
            )
            .bind(&scheduled_job_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter().map(JobRun::try_from).collect()
        })
    }

    fn get_job_run(&self, id: &str) -> BoxFuture<'_, Result<Option<JobRun>>> {
        let id = id.to_string();
        Box::pin(async move {
            let row: Option<JobRunRow> = sqlx::query_as("SELECT * FROM job_runs WHERE id = ?")
                .bind(&id)
                .fetch_optional(&self.pool)
                .await?;
            row.map(JobRun::try_from).transpose()
        })
    }

    fn list_running_runs(&self) -> BoxFuture<'_, Result<Vec<JobRun>>> {
        Box::pin(async move {
            let rows: Vec<JobRunRow> =
                sqlx::query_as("SELECT * FROM job_runs WHERE status = 'running'")
                    .fetch_all(&self.pool)
                    .await?;
            rows.into_iter().map(JobRun::try_from).collect()
        })
    }

    fn cleanup_old_job_runs(&self, retention_days: u32) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
            let result = sqlx::query("DELETE FROM job_runs WHERE started_at < ?")
                .bind(cutoff.to_rfc3339())
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
    }

    fn job_run_stats(&self, scheduled_job_id: Option<&str>) -> BoxFuture<'_, Result<JobRunStats>> {
        let scheduled_job_id = scheduled_job_id.map(str::to_string);
        Box::pin(async move {
            let rows = if let Some(ref id) = scheduled_job_id {
                sqlx::query("SELECT status, COUNT(*) as n FROM job_runs WHERE scheduled_job_id = ? GROUP BY status")
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            } else {
                sqlx::query("SELECT status, COUNT(*) as n FROM job_runs GROUP BY status")
                    .fetch_all(&self.pool)
                    .await?
            };

            let mut stats = JobRunStats::default();
            for row in rows {
                let status: String = row.try_get("status")?;
                let n: i64 = row.try_get("n")?;
                match status.parse::<RunStatus>()? {
                    RunStatus::Pending => stats.pending = n,
                    RunStatus::Running => stats.running = n,
                    RunStatus::Completed => stats.completed = n,
                    RunStatus::Failed => stats.failed = n,
                }
            }
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_job() -> CreateScheduledJob {
        CreateScheduledJob {
            name: "test job".into(),
            job_type: JobType::Scrape,
            job_config: json!({}),
            url: Some("https://example.com".into()),
            urls: None,
            api_endpoint: "https://api.example.com".into(),
            schedule_type: ScheduleType::Hourly,
            schedule_config: json!({}),
            timezone: "UTC".into(),
            is_active: true,
        }
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let created = store.create_scheduled_job(sample_job()).await.unwrap();
        assert!(created.next_run_at >= created.created_at);

        let fetched = store.get_scheduled_job(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.name, "test job");
    }

    #[tokio::test]
    async fn update_refreshes_updated_at_and_next_run_at() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let created = store.create_scheduled_job(sample_job()).await.unwrap();

        let patch = ScheduledJobPatch {
            name: Some("renamed".into()),
            ..Default::default()
        };
        let updated = store.update_scheduled_job(&created.id, patch).await.unwrap();
        assert_eq!(updated.name, "renamed");
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn pausing_a_job_leaves_next_run_at_untouched() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let created = store.create_scheduled_job(sample_job()).await.unwrap();

        let patch = ScheduledJobPatch {
            is_active: Some(false),
            ..Default::default()
        };
        let paused = store.update_scheduled_job(&created.id, patch).await.unwrap();
        assert!(!paused.is_active);
        assert_eq!(paused.next_run_at, created.next_run_at);

        // Re-activation recomputes next_run_at from the current instant.
        let patch = ScheduledJobPatch {
            is_active: Some(true),
            ..Default::default()
        };
        let resumed = store.update_scheduled_job(&created.id, patch).await.unwrap();
        assert!(resumed.is_active);
        assert!(resumed.next_run_at >= resumed.updated_at);
    }

    #[tokio::test]
    async fn update_missing_job_is_not_found() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let err = store
            .update_scheduled_job("missing", ScheduledJobPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_cascades_to_job_runs() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let job = store.create_scheduled_job(sample_job()).await.unwrap();

        let run = JobRun {
            id: Uuid::new_v4().to_string(),
            scheduled_job_id: job.id.clone(),
            run_type: RunType::Scheduled,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            result_data: None,
            error_message: None,
            execution_time_ms: None,
        };
        store.create_job_run(run).await.unwrap();

        store.delete_scheduled_job(&job.id).await.unwrap();

        let runs = store.list_job_runs(&job.id, 50).await.unwrap();
        assert!(runs.is_empty());
    }

    #[tokio::test]
    async fn list_running_runs_finds_orphans() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let job = store.create_scheduled_job(sample_job()).await.unwrap();

        let run = JobRun {
            id: Uuid::new_v4().to_string(),
            scheduled_job_id: job.id.clone(),
            run_type: RunType::Scheduled,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            result_data: None,
            error_message: None,
            execution_time_ms: None,
        };
        store.create_job_run(run).await.unwrap();

        let running = store.list_running_runs().await.unwrap();
        assert_eq!(running.len(), 1);
    }

    #[tokio::test]
    async fn cleanup_old_job_runs_deletes_only_past_retention() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let job = store.create_scheduled_job(sample_job()).await.unwrap();

        let old_run = JobRun {
            id: Uuid::new_v4().to_string(),
            scheduled_job_id: job.id.clone(),
            run_type: RunType::Scheduled,
            status: RunStatus::Completed,
            started_at: Utc::now() - chrono::Duration::days(40),
            completed_at: Some(Utc::now() - chrono::Duration::days(40)),
            result_data: None,
            error_message: None,
            execution_time_ms: Some(10),
        };
        let recent_run = JobRun {
            id: Uuid::new_v4().to_string(),
            scheduled_job_id: job.id.clone(),
            run_type: RunType::Scheduled,
            status: RunStatus::Completed,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
            result_data: None,
            error_message: None,
            execution_time_ms: Some(10),
        };
        store.create_job_run(old_run.clone()).await.unwrap();
        store.create_job_run(recent_run.clone()).await.unwrap();

        let deleted = store.cleanup_old_job_runs(30).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining = store.list_job_runs(&job.id, 50).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, recent_run.id);
        assert!(store.get_job_run(&old_run.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn job_run_stats_groups_by_status() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let job = store.create_scheduled_job(sample_job()).await.unwrap();

        for status in [RunStatus::Completed, RunStatus::Completed, RunStatus::Failed] {
            let run = JobRun {
                id: Uuid::new_v4().to_string(),
                scheduled_job_id: job.id.clone(),
                run_type: RunType::Scheduled,
                status,
                started_at: Utc::now(),
                completed_at: Some(Utc::now()),
                result_data: None,
                error_message: None,
                execution_time_ms: Some(10),
            };
            store.create_job_run(run).await.unwrap();
        }

        let stats = store.job_run_stats(Some(&job.id)).await.unwrap();
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
    }
}
