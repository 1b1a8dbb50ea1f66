//! Pipeline task
//!
//! Runs the stages of one pipeline execution strictly in order. A stage only
//! starts once the previous one finished SUCCESS; the first failed stage ends
//! the run.

use cascade_core::domain::definition::{PipelineDefinition, StageDefinition};
use cascade_core::domain::execution::{
    ExecutionStatus, JobExecution, PipelineExecution, StageExecution,
};
use tracing::{error, info, warn};

use super::Inner;
use super::stage::{self, StageCompleted};
use crate::repository::StoreError;

/// Drives a PENDING pipeline execution to a terminal status
pub(crate) async fn run_pipeline(
    inner: &Inner,
    definition: PipelineDefinition,
    mut execution: PipelineExecution,
    working_dir: Option<String>,
) -> PipelineExecution {
    let status = match run_stages(inner, &definition, &mut execution, working_dir.as_deref()).await {
        Ok(status) => status,
        Err(e) => {
            error!(
                "Pipeline '{}' run #{} aborted: {}",
                execution.pipeline_name, execution.run_number, e
            );
            ExecutionStatus::Failed
        }
    };

    if let Err(e) = finish(inner, &mut execution, status).await {
        error!(
            "Failed to record final status of pipeline '{}' run #{}: {}",
            execution.pipeline_name, execution.run_number, e
        );
    }

    info!(
        "Pipeline '{}' run #{} finished with status {}",
        execution.pipeline_name, execution.run_number, execution.status
    );
    execution
}

async fn run_stages(
    inner: &Inner,
    definition: &PipelineDefinition,
    execution: &mut PipelineExecution,
    working_dir: Option<&str>,
) -> Result<ExecutionStatus, StoreError> {
    execution.transition(ExecutionStatus::Running)?;
    inner.store.update_pipeline_execution(execution).await?;

    info!(
        "Pipeline '{}' run #{} started ({} stage(s))",
        execution.pipeline_name,
        execution.run_number,
        definition.stages.len()
    );

    for (order, stage_definition) in definition.stages.iter().enumerate() {
        let stage = start_stage(inner, execution, order, stage_definition).await?;
        let completed = stage::run_stage(inner, stage, stage_definition, working_dir).await;

        if completed.status != ExecutionStatus::Success {
            report_failures(inner, &completed).await;
            return Ok(ExecutionStatus::Failed);
        }
    }

    Ok(ExecutionStatus::Success)
}

/// Creates the stage and its PENDING jobs, then marks the stage RUNNING
async fn start_stage(
    inner: &Inner,
    execution: &PipelineExecution,
    order: usize,
    definition: &StageDefinition,
) -> Result<StageExecution, StoreError> {
    let mut stage = StageExecution::new(execution.id, &definition.name, order as i32);
    inner.store.create_stage_execution(&stage).await?;

    let jobs: Vec<JobExecution> = definition
        .jobs
        .iter()
        .map(|job| JobExecution::new(stage.id, &job.name, job.allow_failure))
        .collect();
    inner.store.create_job_executions(&jobs).await?;

    stage.transition(ExecutionStatus::Running)?;
    inner.store.update_stage_execution(&stage).await?;

    Ok(stage)
}

async fn finish(
    inner: &Inner,
    execution: &mut PipelineExecution,
    status: ExecutionStatus,
) -> Result<(), StoreError> {
    if !execution.status.is_terminal() {
        execution.transition(status)?;
    }
    inner.store.update_pipeline_execution(execution).await
}

/// Logs every job that failed the stage, with its captured output
async fn report_failures(inner: &Inner, completed: &StageCompleted) {
    let jobs = match inner
        .store
        .find_jobs_by_stage_execution(completed.stage_execution_id)
        .await
    {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(
                "Could not load jobs of failed stage '{}': {}",
                completed.stage_name, e
            );
            return;
        }
    };

    for job in jobs
        .iter()
        .filter(|j| j.status == ExecutionStatus::Failed && !j.allow_failure)
    {
        error!(
            "Job '{}' in stage '{}' failed:\n{}",
            job.job_name,
            completed.stage_name,
            job.logs.trim_end()
        );
    }
}
