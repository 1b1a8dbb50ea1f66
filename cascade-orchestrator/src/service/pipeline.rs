//! Pipeline Service
//!
//! Validation and dry runs over submitted pipeline definitions. Nothing here
//! touches the execution store.

use cascade_core::domain::definition::PipelineDefinition;
use cascade_core::{
    ExecutionOrder, OrderError, ValidationReport, generate_execution_order, validate_pipeline,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is invalid:\n{0}")]
    Invalid(ValidationReport),

    #[error(transparent)]
    Order(#[from] OrderError),
}

/// Runs structural and dependency validation
pub fn validate(pipeline: &PipelineDefinition) -> Result<(), ValidationReport> {
    let result = validate_pipeline(pipeline);
    match &result {
        Ok(()) => tracing::debug!("Pipeline '{}' is valid", pipeline.name),
        Err(report) => tracing::info!(
            "Pipeline '{}' rejected with {} error(s)",
            pipeline.name,
            report.len()
        ),
    }
    result
}

/// Validates the pipeline and returns the order its jobs would run in
pub fn dry_run(pipeline: &PipelineDefinition) -> Result<ExecutionOrder, PipelineError> {
    validate(pipeline).map_err(PipelineError::Invalid)?;
    let order = generate_execution_order(pipeline)?;

    tracing::debug!("Dry run for '{}':\n{}", pipeline.name, order);

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::domain::definition::{JobDefinition, StageDefinition};

    fn job(name: &str, deps: &[&str]) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            image: "alpine".to_string(),
            script: vec!["echo ok".to_string()],
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            allow_failure: false,
        }
    }

    #[test]
    fn test_dry_run_orders_stages_and_jobs() {
        let pipeline = PipelineDefinition {
            name: "demo".to_string(),
            stages: vec![
                StageDefinition {
                    name: "build".to_string(),
                    jobs: vec![job("compile", &[])],
                },
                StageDefinition {
                    name: "test".to_string(),
                    jobs: vec![job("unit", &["compile"])],
                },
            ],
        };

        let order = dry_run(&pipeline).unwrap();
        assert_eq!(order.to_string(), "build: [compile]\ntest: [unit]\n");
    }

    #[test]
    fn test_dry_run_rejects_invalid_pipeline() {
        let pipeline = PipelineDefinition {
            name: "demo".to_string(),
            stages: vec![StageDefinition {
                name: "build".to_string(),
                jobs: vec![job("a", &["b"]), job("b", &["a"])],
            }],
        };

        match dry_run(&pipeline) {
            Err(PipelineError::Invalid(report)) => assert_eq!(report.cycles().count(), 1),
            other => panic!("expected invalid pipeline, got {:?}", other),
        }
    }
}
