//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod execution;
pub mod health;
pub mod pipeline;
pub mod report;

use axum::{
    Router,
    routing::{get, post},
};
use cascade_runner::WorkerPool;
use tower_http::trace::TraceLayer;

use crate::engine::Orchestrator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub workers: WorkerPool,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/workers", get(health::worker_status))
        // Pipeline endpoints
        .route("/pipeline/validate", post(pipeline::validate_pipeline))
        .route("/pipeline/dry-run", post(pipeline::dry_run))
        .route("/pipeline/run", post(pipeline::run_pipeline))
        // Execution endpoints
        .route("/execution/{id}", get(execution::get_execution))
        // Report endpoints
        .route("/report", get(report::list_pipelines))
        .route("/report/{pipeline}", get(report::pipeline_report))
        .route("/report/{pipeline}/{run}", get(report::run_report))
        .route("/report/{pipeline}/{run}/{stage}", get(report::stage_report))
        .route(
            "/report/{pipeline}/{run}/{stage}/{job}",
            get(report::job_report),
        )
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
