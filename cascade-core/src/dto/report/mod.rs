//! Report DTOs
//!
//! Read-only views over execution records for status queries and reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::{ExecutionStatus, JobExecution, PipelineExecution, StageExecution};

/// A pipeline execution with its stages and their jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecutionDetail {
    pub execution: PipelineExecution,
    pub stages: Vec<StageExecutionDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecutionDetail {
    pub stage: StageExecution,
    pub jobs: Vec<JobExecution>,
}

/// One entry of a pipeline's run history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub execution_id: Uuid,
    pub run_number: i32,
    pub status: ExecutionStatus,
    pub commit_hash: Option<String>,
    pub is_local: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Run history of one pipeline, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub pipeline_name: String,
    pub runs: Vec<RunSummary>,
}

/// Full summary of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub pipeline_name: String,
    #[serde(flatten)]
    pub summary: RunSummary,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage_name: String,
    pub execution_order: i32,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_name: String,
    pub status: ExecutionStatus,
    pub allow_failure: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One job of one run, including its captured logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub pipeline_name: String,
    pub run_number: i32,
    pub stage_name: String,
    #[serde(flatten)]
    pub job: JobSummary,
    pub logs: String,
}

impl From<&PipelineExecution> for RunSummary {
    fn from(execution: &PipelineExecution) -> Self {
        Self {
            execution_id: execution.id,
            run_number: execution.run_number,
            status: execution.status,
            commit_hash: execution.commit_hash.clone(),
            is_local: execution.is_local,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
        }
    }
}

impl From<&JobExecution> for JobSummary {
    fn from(job: &JobExecution) -> Self {
        Self {
            job_name: job.job_name.clone(),
            status: job.status,
            allow_failure: job.allow_failure,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

impl From<&StageExecutionDetail> for StageReport {
    fn from(detail: &StageExecutionDetail) -> Self {
        Self {
            stage_name: detail.stage.stage_name.clone(),
            execution_order: detail.stage.execution_order,
            status: detail.stage.status,
            started_at: detail.stage.started_at,
            completed_at: detail.stage.completed_at,
            jobs: detail.jobs.iter().map(JobSummary::from).collect(),
        }
    }
}

impl From<&PipelineExecutionDetail> for RunReport {
    fn from(detail: &PipelineExecutionDetail) -> Self {
        Self {
            pipeline_name: detail.execution.pipeline_name.clone(),
            summary: RunSummary::from(&detail.execution),
            stages: detail.stages.iter().map(StageReport::from).collect(),
        }
    }
}

impl PipelineExecutionDetail {
    pub fn stage(&self, name: &str) -> Option<&StageExecutionDetail> {
        self.stages.iter().find(|s| s.stage.stage_name == name)
    }

    /// Jobs that failed without allow-failure, with their stage name
    pub fn blocking_failures(&self) -> impl Iterator<Item = (&str, &JobExecution)> {
        self.stages.iter().flat_map(|stage| {
            stage
                .jobs
                .iter()
                .filter(|job| job.status == ExecutionStatus::Failed && !job.allow_failure)
                .map(move |job| (stage.stage.stage_name.as_str(), job))
        })
    }
}
