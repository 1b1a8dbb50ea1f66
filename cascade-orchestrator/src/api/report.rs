//! Report API Handlers
//!
//! Run history and per-run, per-stage and per-job reports.

use axum::{
    Json,
    extract::{Path, State},
};
use cascade_core::dto::report::{JobReport, PipelineReport, RunReport, StageReport};

use super::AppState;
use crate::api::error::ApiResult;
use crate::service::report_service;

/// GET /report
/// List pipelines that have runs
pub async fn list_pipelines(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let store = state.orchestrator.store();
    Ok(Json(report_service::list_pipelines(store.as_ref()).await?))
}

/// GET /report/{pipeline}
pub async fn pipeline_report(
    State(state): State<AppState>,
    Path(pipeline): Path<String>,
) -> ApiResult<Json<PipelineReport>> {
    let store = state.orchestrator.store();
    Ok(Json(report_service::pipeline_report(store.as_ref(), &pipeline).await?))
}

/// GET /report/{pipeline}/{run}
pub async fn run_report(
    State(state): State<AppState>,
    Path((pipeline, run)): Path<(String, i32)>,
) -> ApiResult<Json<RunReport>> {
    let store = state.orchestrator.store();
    Ok(Json(report_service::run_report(store.as_ref(), &pipeline, run).await?))
}

/// GET /report/{pipeline}/{run}/{stage}
pub async fn stage_report(
    State(state): State<AppState>,
    Path((pipeline, run, stage)): Path<(String, i32, String)>,
) -> ApiResult<Json<StageReport>> {
    let store = state.orchestrator.store();
    Ok(Json(
        report_service::stage_report(store.as_ref(), &pipeline, run, &stage).await?,
    ))
}

/// GET /report/{pipeline}/{run}/{stage}/{job}
/// Job status and captured logs
pub async fn job_report(
    State(state): State<AppState>,
    Path((pipeline, run, stage, job)): Path<(String, i32, String, String)>,
) -> ApiResult<Json<JobReport>> {
    let store = state.orchestrator.store();
    Ok(Json(
        report_service::job_report(store.as_ref(), &pipeline, run, &stage, &job).await?,
    ))
}
