//! Request handlers: validate input, translate to Store/Scheduler calls,
//! serialize the `{success, data|schedules|runs}` envelope used throughout
//! the management API.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::model::{CreateScheduledJob, ScheduledJobPatch};
use crate::web::AppState;

const DEFAULT_RUNS_LIMIT: i64 = 50;

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    payload: T,
}

fn ok<T: Serialize>(payload: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        payload,
    })
}

#[derive(Serialize)]
struct DataField<T: Serialize> {
    data: T,
}

#[derive(Serialize)]
struct SchedulesField<T: Serialize> {
    schedules: T,
}

#[derive(Serialize)]
struct RunsField<T: Serialize> {
    runs: T,
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Json(payload): Json<CreateScheduledJob>,
) -> Result<impl IntoResponse> {
    validate_create(&payload)?;
    let job = state.store.create_scheduled_job(payload).await?;
    if job.is_active {
        state.scheduler.schedule_job(&job).await?;
    }
    Ok(ok(DataField { data: job }))
}

fn validate_create(payload: &CreateScheduledJob) -> Result<()> {
    if payload.name.trim().is_empty() {
        return Err(Error::Validation("name must not be empty".to_string()));
    }
    if payload.api_endpoint.trim().is_empty() {
        return Err(Error::Validation("apiEndpoint must not be empty".to_string()));
    }
    if payload.job_type.takes_single_url() {
        if payload.url.as_deref().unwrap_or("").is_empty() {
            return Err(Error::Validation(format!(
                "jobType '{}' requires a non-empty url",
                payload.job_type
            )));
        }
        if payload.urls.is_some() {
            return Err(Error::Validation(format!(
                "jobType '{}' must not set urls",
                payload.job_type
            )));
        }
    } else {
        match &payload.urls {
            Some(urls) if !urls.is_empty() => {}
            _ => {
                return Err(Error::Validation(
                    "jobType 'batch' requires a non-empty urls list".to_string(),
                ));
            }
        }
        if payload.url.is_some() {
            return Err(Error::Validation(
                "jobType 'batch' must not set url".to_string(),
            ));
        }
    }
    Ok(())
}

pub async fn list_schedules(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let jobs = state.store.list_scheduled_jobs().await?;
    Ok(ok(SchedulesField { schedules: jobs }))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let job = state
        .store
        .get_scheduled_job(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("scheduled job '{id}' not found")))?;
    Ok(ok(DataField { data: job }))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ScheduledJobPatch>,
) -> Result<impl IntoResponse> {
    let job = state.store.update_scheduled_job(&id, patch).await?;
    if job.is_active {
        state.scheduler.schedule_job(&job).await?;
    } else {
        state.scheduler.unschedule_job(&job.id).await?;
    }
    Ok(ok(DataField { data: job }))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.scheduler.unschedule_job(&id).await?;
    state.store.delete_scheduled_job(&id).await?;
    Ok(ok(DataField { data: json!({ "deleted": true }) }))
}

pub async fn run_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let run = state.scheduler.execute_job_manually(&id).await?;
    Ok(ok(DataField { data: run }))
}

#[derive(Deserialize, Default)]
pub struct RunsQuery {
    limit: Option<i64>,
}

pub async fn list_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RunsQuery>,
) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_RUNS_LIMIT);
    let runs = state.store.list_job_runs(&id, limit).await?;
    Ok(ok(RunsField { runs }))
}

pub async fn scheduler_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let status = state.scheduler.status().await;
    let stats = state.store.job_run_stats(None).await?;
    Ok(ok(DataField {
        data: json!({
            "running": status.running,
            "count": status.count,
            "ids": status.ids,
            "stats": stats,
        }),
    }))
}

#[derive(Deserialize)]
pub struct SchedulerControl {
    action: String,
}

pub async fn scheduler_control(
    State(state): State<AppState>,
    Json(body): Json<SchedulerControl>,
) -> Result<impl IntoResponse> {
    match body.action.as_str() {
        "start" => state.scheduler.start().await?,
        "stop" => state.scheduler.stop(state.shutdown_timeout).await?,
        other => {
            return Err(Error::Validation(format!(
                "unknown scheduler action '{other}'"
            )));
        }
    }
    let status = state.scheduler.status().await;
    Ok(ok(DataField {
        data: json!({ "running": status.running }),
    }))
}

pub async fn scheduler_reload(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.scheduler.reload().await?;
    let status = state.scheduler.status().await;
    Ok(ok(DataField {
        data: json!({ "count": status.count }),
    }))
}

pub async fn startup(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let recovered = crate::scheduler::recover_orphaned_runs(state.store.as_ref()).await?;
    state.scheduler.start().await?;
    let status = state.scheduler.status().await;
    Ok(ok(DataField {
        data: json!({
            "recoveredOrphans": recovered,
            "registered": status.count,
        }),
    }))
}
