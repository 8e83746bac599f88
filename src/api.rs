use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::ingest::aggregator::RunReport;
use crate::ingest::scheduler::{Scheduler, TriggerError};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/admin/aggregate/matches", post(aggregate_matches))
        .route("/admin/aggregate/news", post(aggregate_news))
        .route("/admin/scheduler", get(scheduler_status))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct ErrorResp {
    error: String,
}

#[derive(serde::Serialize)]
struct SchedulerStatus {
    running: bool,
    matches_running: bool,
    news_running: bool,
}

fn report_response(res: Result<RunReport, TriggerError>) -> Response {
    match res {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "manual aggregation rejected");
            (
                StatusCode::CONFLICT,
                Json(ErrorResp {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn aggregate_matches(State(state): State<AppState>) -> Response {
    report_response(state.scheduler.matches_job().run_now().await)
}

async fn aggregate_news(State(state): State<AppState>) -> Response {
    report_response(state.scheduler.news_job().run_now().await)
}

async fn scheduler_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    let s = &state.scheduler;
    Json(SchedulerStatus {
        running: s.is_running(),
        matches_running: s.matches_job().is_running(),
        news_running: s.news_job().is_running(),
    })
}
