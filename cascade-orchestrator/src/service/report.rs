//! Report Service
//!
//! Read-only queries over execution records: run history, run summaries and
//! per-stage and per-job views including captured logs.

use cascade_core::domain::execution::PipelineExecution;
use cascade_core::dto::report::{
    JobReport, JobSummary, PipelineExecutionDetail, PipelineReport, RunReport, RunSummary,
    StageExecutionDetail, StageReport,
};
use thiserror::Error;
use uuid::Uuid;

use crate::repository::{ExecutionStore, StoreError};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Names of pipelines with at least one run
pub async fn list_pipelines(store: &dyn ExecutionStore) -> Result<Vec<String>, ReportError> {
    Ok(store.list_pipeline_names().await?)
}

/// Run history of one pipeline, newest first
pub async fn pipeline_report(
    store: &dyn ExecutionStore,
    pipeline_name: &str,
) -> Result<PipelineReport, ReportError> {
    let runs = store.list_pipeline_executions(pipeline_name).await?;
    if runs.is_empty() {
        return Err(ReportError::NotFound(format!(
            "No runs found for pipeline '{}'",
            pipeline_name
        )));
    }

    Ok(PipelineReport {
        pipeline_name: pipeline_name.to_string(),
        runs: runs.iter().map(RunSummary::from).collect(),
    })
}

/// A pipeline execution with its stages and jobs
pub async fn execution_detail(
    store: &dyn ExecutionStore,
    id: Uuid,
) -> Result<PipelineExecutionDetail, ReportError> {
    let execution = store
        .find_pipeline_execution(id)
        .await?
        .ok_or_else(|| ReportError::NotFound(format!("Pipeline execution {} not found", id)))?;

    load_detail(store, execution).await
}

/// Summary of one run with every stage and job status
pub async fn run_report(
    store: &dyn ExecutionStore,
    pipeline_name: &str,
    run_number: i32,
) -> Result<RunReport, ReportError> {
    let detail = find_run(store, pipeline_name, run_number).await?;
    Ok(RunReport::from(&detail))
}

pub async fn stage_report(
    store: &dyn ExecutionStore,
    pipeline_name: &str,
    run_number: i32,
    stage_name: &str,
) -> Result<StageReport, ReportError> {
    let detail = find_run(store, pipeline_name, run_number).await?;
    let stage = find_stage(&detail, stage_name)?;
    Ok(StageReport::from(stage))
}

/// One job of a run, including its logs
pub async fn job_report(
    store: &dyn ExecutionStore,
    pipeline_name: &str,
    run_number: i32,
    stage_name: &str,
    job_name: &str,
) -> Result<JobReport, ReportError> {
    let detail = find_run(store, pipeline_name, run_number).await?;
    let stage = find_stage(&detail, stage_name)?;
    let job = stage
        .jobs
        .iter()
        .find(|j| j.job_name == job_name)
        .ok_or_else(|| {
            ReportError::NotFound(format!(
                "Job '{}' not found in stage '{}' of {} #{}",
                job_name, stage_name, pipeline_name, run_number
            ))
        })?;

    Ok(JobReport {
        pipeline_name: pipeline_name.to_string(),
        run_number,
        stage_name: stage_name.to_string(),
        job: JobSummary::from(job),
        logs: job.logs.clone(),
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn find_run(
    store: &dyn ExecutionStore,
    pipeline_name: &str,
    run_number: i32,
) -> Result<PipelineExecutionDetail, ReportError> {
    let execution = store
        .find_pipeline_execution_by_run(pipeline_name, run_number)
        .await?
        .ok_or_else(|| {
            ReportError::NotFound(format!("Run {} #{} not found", pipeline_name, run_number))
        })?;

    load_detail(store, execution).await
}

async fn load_detail(
    store: &dyn ExecutionStore,
    execution: PipelineExecution,
) -> Result<PipelineExecutionDetail, ReportError> {
    let mut stages = Vec::new();
    for stage in store.find_stages_by_pipeline_execution(execution.id).await? {
        let jobs = store.find_jobs_by_stage_execution(stage.id).await?;
        stages.push(StageExecutionDetail { stage, jobs });
    }

    Ok(PipelineExecutionDetail { execution, stages })
}

fn find_stage<'a>(
    detail: &'a PipelineExecutionDetail,
    stage_name: &str,
) -> Result<&'a StageExecutionDetail, ReportError> {
    detail.stage(stage_name).ok_or_else(|| {
        ReportError::NotFound(format!(
            "Stage '{}' not found in {} #{}",
            stage_name, detail.execution.pipeline_name, detail.execution.run_number
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;
    use cascade_core::domain::execution::{ExecutionStatus, JobExecution, StageExecution};

    async fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        let run = store.create_pipeline_execution("demo", Some("abc".into()), false).await.unwrap();
        store.create_pipeline_execution("demo", None, true).await.unwrap();

        let stage = StageExecution::new(run.id, "build", 0);
        store.create_stage_execution(&stage).await.unwrap();
        let job = JobExecution::new(stage.id, "compile", false);
        store.create_job_executions(&[job.clone()]).await.unwrap();
        store.transition_job(job.id, ExecutionStatus::Running, "").await.unwrap();
        store
            .transition_job(job.id, ExecutionStatus::Failed, "boom\n")
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_pipeline_report_lists_newest_first() {
        let store = seeded_store().await;
        let report = pipeline_report(&store, "demo").await.unwrap();

        let numbers: Vec<_> = report.runs.iter().map(|r| r.run_number).collect();
        assert_eq!(numbers, vec![2, 1]);
        assert_eq!(list_pipelines(&store).await.unwrap(), vec!["demo"]);
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_not_found() {
        let store = InMemoryStore::new();
        assert!(matches!(
            pipeline_report(&store, "nope").await,
            Err(ReportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_job_report_includes_logs() {
        let store = seeded_store().await;
        let report = job_report(&store, "demo", 1, "build", "compile").await.unwrap();

        assert_eq!(report.job.status, ExecutionStatus::Failed);
        assert_eq!(report.logs, "boom\n");
        assert_eq!(report.stage_name, "build");
    }

    #[tokio::test]
    async fn test_run_and_stage_reports() {
        let store = seeded_store().await;

        let run = run_report(&store, "demo", 1).await.unwrap();
        assert_eq!(run.summary.commit_hash.as_deref(), Some("abc"));
        assert_eq!(run.stages.len(), 1);
        assert_eq!(run.stages[0].jobs[0].job_name, "compile");

        let stage = stage_report(&store, "demo", 1, "build").await.unwrap();
        assert_eq!(stage.jobs.len(), 1);

        assert!(matches!(
            stage_report(&store, "demo", 1, "deploy").await,
            Err(ReportError::NotFound(_))
        ));
        assert!(matches!(
            run_report(&store, "demo", 9).await,
            Err(ReportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_execution_detail_loads_stages_and_jobs() {
        let store = seeded_store().await;
        let run = store.find_pipeline_execution_by_run("demo", 1).await.unwrap().unwrap();

        let detail = execution_detail(&store, run.id).await.unwrap();
        assert_eq!(detail.stages.len(), 1);
        assert_eq!(detail.blocking_failures().count(), 1);
    }
}
