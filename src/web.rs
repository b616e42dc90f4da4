//! Management HTTP API.

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::scheduler::SchedulerHandle;
use crate::store::Store;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub scheduler: SchedulerHandle,
    pub shutdown_timeout: Duration,
}

/// Creates the axum router with all management endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/schedules", get(handlers::list_schedules).post(handlers::create_schedule))
        .route(
            "/schedules/{id}",
            get(handlers::get_schedule)
                .put(handlers::update_schedule)
                .delete(handlers::delete_schedule),
        )
        .route("/schedules/{id}/run", post(handlers::run_schedule))
        .route("/schedules/{id}/runs", get(handlers::list_runs))
        .route(
            "/scheduler/status",
            get(handlers::scheduler_status).post(handlers::scheduler_control),
        )
        .route("/scheduler/reload", post(handlers::scheduler_reload))
        .route("/startup", post(handlers::startup))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
