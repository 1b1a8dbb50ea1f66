//! Execution API Handlers
//!
//! Status of a single pipeline execution.

use axum::{
    Json,
    extract::{Path, State},
};
use cascade_core::dto::report::PipelineExecutionDetail;
use uuid::Uuid;

use super::AppState;
use crate::api::error::ApiResult;
use crate::service::report_service;

/// GET /execution/{id}
/// Get a pipeline execution with its stages and jobs
pub async fn get_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineExecutionDetail>> {
    tracing::debug!("Getting execution: {}", id);

    let store = state.orchestrator.store();
    let detail = report_service::execution_detail(store.as_ref(), id).await?;
    Ok(Json(detail))
}
