//! REST endpoints for submitting crawls and polling their state.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{Error, TaskError};
use crate::orchestrator::Orchestrator;
use crate::tasks::logs::DEFAULT_TAIL;
use crate::tasks::model::{CrawlMode, TaskRecord};
use crate::worker::launcher::JobParameters;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Build the Axum router with the crawl API routes.
pub fn crawl_routes(orchestrator: Arc<Orchestrator>) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/crawl/start/{mode}", post(start_crawl))
        .route("/api/v1/crawl/status/{task_id}", get(get_status))
        .route("/api/v1/crawl/logs/{task_id}", get(get_logs))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({"error": message.into()})))
}

/// Map an orchestrator error to its HTTP status.
fn api_error(e: Error) -> ApiError {
    let status = match &e {
        Error::Task(TaskError::NotFound { .. }) => StatusCode::NOT_FOUND,
        Error::Task(TaskError::InvalidId(_) | TaskError::InvalidMode { .. }) => {
            StatusCode::BAD_REQUEST
        }
        Error::Task(_) => StatusCode::CONFLICT,
        Error::Config(_) | Error::Launch(_) | Error::Artifact(_) | Error::Log(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!(error = %e, "Request failed");
    }
    error_body(status, e.to_string())
}

fn parse_task_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| api_error(TaskError::InvalidId(raw.to_string()).into()))
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let tasks = state.orchestrator.registry().summary().await;
    Json(serde_json::json!({
        "status": "ok",
        "service": "crawl-orchestrator",
        "tasks": tasks,
    }))
}

// ── Crawl ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CrawlRequest {
    user_id: String,
    cookie: String,
}

async fn start_crawl(
    State(state): State<AppState>,
    Path(mode): Path<String>,
    body: Result<Json<CrawlRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mode: CrawlMode = mode.parse().map_err(|e: TaskError| api_error(e.into()))?;
    let Json(body) = body.map_err(|e| error_body(e.status(), e.body_text()))?;

    let params = JobParameters::new(body.user_id, body.cookie);
    let task_id = state.orchestrator.submit(mode, params).await;
    info!(task_id = %task_id, mode = %mode, "Crawl started");

    Ok(Json(serde_json::json!({"status": "started", "task_id": task_id})))
}

async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    let task_id = parse_task_id(&id)?;

    state
        .orchestrator
        .status(task_id)
        .await
        .map(Json)
        .map_err(|e| api_error(e.into()))
}

#[derive(Deserialize)]
struct LogsQuery {
    tail: Option<usize>,
}

async fn get_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task_id = parse_task_id(&id)?;
    let Query(query) = query.map_err(|e| error_body(StatusCode::BAD_REQUEST, e.body_text()))?;
    let tail = query.tail.unwrap_or(DEFAULT_TAIL);

    let logs = state
        .orchestrator
        .logs(task_id, tail)
        .await
        .map_err(api_error)?;

    Ok(Json(serde_json::json!({
        "task_id": task_id,
        "lines": logs.lines,
        "total_line_count": logs.total_line_count,
    })))
}
