//! Core data model: scheduled jobs and their run history.
//!
//! A closed enum per tag field, a plain struct per row.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ============================================================================
// ScheduledJob
// ============================================================================

/// Operation a scheduled job performs against the remote scraping service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Scrape,
    Crawl,
    Map,
    Batch,
}

impl JobType {
    /// Whether this job type takes a single `url` (vs. a `urls` batch).
    pub fn takes_single_url(self) -> bool {
        matches!(self, JobType::Scrape | JobType::Crawl | JobType::Map)
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobType::Scrape => "scrape",
            JobType::Crawl => "crawl",
            JobType::Map => "map",
            JobType::Batch => "batch",
        };
        f.write_str(s)
    }
}

impl FromStr for JobType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scrape" => Ok(JobType::Scrape),
            "crawl" => Ok(JobType::Crawl),
            "map" => Ok(JobType::Map),
            "batch" => Ok(JobType::Batch),
            other => Err(Error::Validation(format!("unknown job_type '{other}'"))),
        }
    }
}

/// Recurrence kind. See `recurrence.rs` for the config shape each kind
/// requires and the cron expression it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Interval,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScheduleType::Interval => "interval",
            ScheduleType::Hourly => "hourly",
            ScheduleType::Daily => "daily",
            ScheduleType::Weekly => "weekly",
            ScheduleType::Monthly => "monthly",
        };
        f.write_str(s)
    }
}

impl FromStr for ScheduleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interval" => Ok(ScheduleType::Interval),
            "hourly" => Ok(ScheduleType::Hourly),
            "daily" => Ok(ScheduleType::Daily),
            "weekly" => Ok(ScheduleType::Weekly),
            "monthly" => Ok(ScheduleType::Monthly),
            other => Err(Error::Validation(format!("unknown schedule_type '{other}'"))),
        }
    }
}

/// A user-defined recurring scrape/crawl/map/batch job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    pub job_type: JobType,
    pub job_config: serde_json::Value,
    pub url: Option<String>,
    pub urls: Option<Vec<String>>,
    pub api_endpoint: String,
    pub schedule_type: ScheduleType,
    pub schedule_config: serde_json::Value,
    pub timezone: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: DateTime<Utc>,
}

impl ScheduledJob {
    /// Checks the `url` xor `urls` invariant required by `job_type`.
    pub fn validate_target(&self) -> Result<(), Error> {
        if self.job_type.takes_single_url() {
            if self.url.as_deref().unwrap_or("").is_empty() {
                return Err(Error::Validation(format!(
                    "job_type '{}' requires a non-empty url",
                    self.job_type
                )));
            }
            if self.urls.is_some() {
                return Err(Error::Validation(format!(
                    "job_type '{}' must not set urls",
                    self.job_type
                )));
            }
        } else {
            match &self.urls {
                Some(urls) if !urls.is_empty() => {}
                _ => {
                    return Err(Error::Validation(
                        "job_type 'batch' requires a non-empty urls list".to_string(),
                    ));
                }
            }
            if self.url.is_some() {
                return Err(Error::Validation(
                    "job_type 'batch' must not set url".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Fields accepted by a partial update (`PUT /schedules/{id}`). Every field
/// left `None` is left untouched on the stored row.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJobPatch {
    pub name: Option<String>,
    pub job_type: Option<JobType>,
    pub job_config: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Option<Vec<String>>>,
    pub api_endpoint: Option<String>,
    pub schedule_type: Option<ScheduleType>,
    pub schedule_config: Option<serde_json::Value>,
    pub timezone: Option<String>,
    pub is_active: Option<bool>,
}

/// Payload accepted by `POST /schedules`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduledJob {
    pub name: String,
    pub job_type: JobType,
    pub job_config: serde_json::Value,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    pub api_endpoint: String,
    pub schedule_type: ScheduleType,
    pub schedule_config: serde_json::Value,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_is_active() -> bool {
    true
}

// ============================================================================
// JobRun
// ============================================================================

/// Whether a run was triggered by the cron dispatcher or by a caller hitting
/// `POST /schedules/{id}/run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Scheduled,
    Manual,
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunType::Scheduled => "scheduled",
            RunType::Manual => "manual",
        })
    }
}

impl FromStr for RunType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(RunType::Scheduled),
            "manual" => Ok(RunType::Manual),
            other => Err(Error::StoreError(format!("unknown run_type '{other}'"))),
        }
    }
}

/// Lifecycle state of a single run attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        })
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(Error::StoreError(format!("unknown run status '{other}'"))),
        }
    }
}

/// One execution attempt of a `ScheduledJob`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRun {
    pub id: String,
    pub scheduled_job_id: String,
    pub run_type: RunType,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<i64>,
}

/// Counts grouped by status, returned by `JobRunStats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobRunStats {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_job(job_type: JobType) -> ScheduledJob {
        let now = Utc::now();
        ScheduledJob {
            id: "job-1".into(),
            name: "test".into(),
            job_type,
            job_config: serde_json::json!({}),
            url: None,
            urls: None,
            api_endpoint: "https://api.example.com".into(),
            schedule_type: ScheduleType::Hourly,
            schedule_config: serde_json::json!({}),
            timezone: "UTC".into(),
            is_active: true,
            created_at: now,
            updated_at: now,
            last_run_at: None,
            next_run_at: now,
        }
    }

    #[test]
    fn scrape_requires_url_not_urls() {
        let mut job = base_job(JobType::Scrape);
        assert!(job.validate_target().is_err());
        job.url = Some("https://example.com".into());
        assert!(job.validate_target().is_ok());
        job.urls = Some(vec!["https://example.com".into()]);
        assert!(job.validate_target().is_err());
    }

    #[test]
    fn batch_requires_nonempty_urls_not_url() {
        let mut job = base_job(JobType::Batch);
        assert!(job.validate_target().is_err());
        job.urls = Some(vec![]);
        assert!(job.validate_target().is_err());
        job.urls = Some(vec!["https://example.com".into()]);
        assert!(job.validate_target().is_ok());
        job.url = Some("https://example.com".into());
        assert!(job.validate_target().is_err());
    }

    #[test]
    fn job_type_round_trips_through_display_and_from_str() {
        for jt in [JobType::Scrape, JobType::Crawl, JobType::Map, JobType::Batch] {
            assert_eq!(jt.to_string().parse::<JobType>().unwrap(), jt);
        }
    }

    #[test]
    fn run_status_terminal_classification() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }
}
