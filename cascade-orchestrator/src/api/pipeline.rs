//! Pipeline API Handlers
//!
//! HTTP endpoints for validating, previewing and running pipelines.

use axum::{Json, extract::State, http::StatusCode};
use cascade_core::ExecutionOrder;
use cascade_core::ValidationError;
use cascade_core::domain::definition::PipelineDefinition;
use cascade_core::domain::execution::PipelineExecution;
use cascade_core::dto::pipeline::RunPipeline;
use serde::Serialize;

use super::AppState;
use crate::api::error::ApiResult;
use crate::service::pipeline_service;

#[derive(Debug, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

/// POST /pipeline/validate
/// Validate a pipeline definition and list every problem found
pub async fn validate_pipeline(Json(pipeline): Json<PipelineDefinition>) -> Json<ValidationResponse> {
    tracing::info!("Validating pipeline: {}", pipeline.name);

    let errors = match pipeline_service::validate(&pipeline) {
        Ok(()) => Vec::new(),
        Err(report) => report.errors,
    };

    Json(ValidationResponse {
        valid: errors.is_empty(),
        errors,
    })
}

/// POST /pipeline/dry-run
/// Show the order jobs would run in without running anything
pub async fn dry_run(Json(pipeline): Json<PipelineDefinition>) -> ApiResult<Json<ExecutionOrder>> {
    tracing::info!("Dry run for pipeline: {}", pipeline.name);

    let order = pipeline_service::dry_run(&pipeline)?;
    Ok(Json(order))
}

/// POST /pipeline/run
/// Validate and start a new run
pub async fn run_pipeline(
    State(state): State<AppState>,
    Json(req): Json<RunPipeline>,
) -> ApiResult<(StatusCode, Json<PipelineExecution>)> {
    tracing::info!("Running pipeline: {}", req.pipeline.name);

    let execution = state.orchestrator.trigger_run(req.pipeline, req.run).await?;
    Ok((StatusCode::ACCEPTED, Json(execution)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiError;
    use cascade_core::domain::definition::{JobDefinition, StageDefinition};

    fn definition(deps: &[&str]) -> PipelineDefinition {
        PipelineDefinition {
            name: "demo".to_string(),
            stages: vec![StageDefinition {
                name: "build".to_string(),
                jobs: vec![JobDefinition {
                    name: "compile".to_string(),
                    image: "rust".to_string(),
                    script: vec!["cargo build".to_string()],
                    dependencies: deps.iter().map(|d| d.to_string()).collect(),
                    allow_failure: false,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn test_validate_reports_every_error() {
        let Json(response) = validate_pipeline(Json(definition(&["missing"]))).await;
        assert!(!response.valid);
        assert_eq!(response.errors.len(), 1);

        let Json(response) = validate_pipeline(Json(definition(&[]))).await;
        assert!(response.valid);
    }

    #[tokio::test]
    async fn test_dry_run_returns_order() {
        let Json(order) = dry_run(Json(definition(&[]))).await.unwrap();
        assert_eq!(order.stage("build"), Some(&["compile".to_string()][..]));
    }

    #[tokio::test]
    async fn test_dry_run_rejects_invalid_pipeline() {
        let err = dry_run(Json(definition(&["compile"]))).await.unwrap_err();
        assert!(matches!(err, ApiError::Invalid(_)));
    }
}
