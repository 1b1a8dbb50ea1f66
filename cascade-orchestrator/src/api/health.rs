//! Health Check API Handlers
//!
//! Liveness and worker pool status.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use uuid::Uuid;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct WorkerStatus {
    pub active_count: usize,
    pub active_jobs: Vec<Uuid>,
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /workers
/// Jobs currently held by the worker pool
pub async fn worker_status(State(state): State<AppState>) -> Json<WorkerStatus> {
    let active_jobs = state.workers.active_jobs();
    Json(WorkerStatus {
        active_count: active_jobs.len(),
        active_jobs,
    })
}
