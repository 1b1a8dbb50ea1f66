//! Repository Module
//!
//! Data access layer for the orchestrator.
//!
//! [`ExecutionStore`] is the boundary the engine and the report service work
//! against. Two implementations exist: [`InMemoryStore`] for single-process use
//! and tests, and [`PgExecutionStore`] backed by the per-entity PostgreSQL
//! repositories in this module.

pub mod job_execution;
pub mod memory;
pub mod pipeline_execution;
pub mod postgres;
pub mod stage_execution;

use async_trait::async_trait;
use cascade_core::domain::execution::{
    ExecutionStatus, JobExecution, PipelineExecution, StageExecution, TransitionError,
};
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryStore;
pub use postgres::PgExecutionStore;

// Re-export for convenience
pub use job_execution as job_execution_repository;
pub use pipeline_execution as pipeline_execution_repository;
pub use stage_execution as stage_execution_repository;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn job_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "job execution",
            id,
        }
    }

    /// A transition on a record that already finished
    pub fn is_already_terminal(&self) -> bool {
        matches!(self, Self::Transition(e) if e.is_already_terminal())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence for pipeline, stage and job execution records
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Creates a PENDING pipeline execution with the next run number for `pipeline_name`
    async fn create_pipeline_execution(
        &self,
        pipeline_name: &str,
        commit_hash: Option<String>,
        is_local: bool,
    ) -> Result<PipelineExecution>;

    async fn update_pipeline_execution(&self, execution: &PipelineExecution) -> Result<()>;

    async fn find_pipeline_execution(&self, id: Uuid) -> Result<Option<PipelineExecution>>;

    async fn find_pipeline_execution_by_run(
        &self,
        pipeline_name: &str,
        run_number: i32,
    ) -> Result<Option<PipelineExecution>>;

    /// Runs of one pipeline, newest first
    async fn list_pipeline_executions(&self, pipeline_name: &str) -> Result<Vec<PipelineExecution>>;

    /// Names of pipelines that have at least one run, sorted
    async fn list_pipeline_names(&self) -> Result<Vec<String>>;

    async fn create_stage_execution(&self, stage: &StageExecution) -> Result<()>;

    async fn update_stage_execution(&self, stage: &StageExecution) -> Result<()>;

    async fn find_stage_execution(&self, id: Uuid) -> Result<Option<StageExecution>>;

    /// Stages of one run in execution order
    async fn find_stages_by_pipeline_execution(
        &self,
        pipeline_execution_id: Uuid,
    ) -> Result<Vec<StageExecution>>;

    async fn create_job_executions(&self, jobs: &[JobExecution]) -> Result<()>;

    async fn find_job_execution(&self, id: Uuid) -> Result<Option<JobExecution>>;

    /// Jobs of one stage in creation order
    async fn find_jobs_by_stage_execution(&self, stage_execution_id: Uuid) -> Result<Vec<JobExecution>>;

    /// Atomically moves a job to `to` and appends `logs`
    ///
    /// Fails with [`StoreError::Transition`] when the current status does not
    /// allow the move, leaving the record untouched.
    async fn transition_job(&self, id: Uuid, to: ExecutionStatus, logs: &str) -> Result<JobExecution>;
}

/// Statuses a record may be in for a move to `to` to be legal
pub(crate) fn allowed_sources(to: ExecutionStatus) -> Vec<ExecutionStatus> {
    [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::Success,
        ExecutionStatus::Failed,
        ExecutionStatus::Canceled,
    ]
    .into_iter()
    .filter(|from| from.can_transition_to(to))
    .collect()
}

/// The error a rejected move from `from` to `to` reports
pub(crate) fn rejected_transition(from: ExecutionStatus, to: ExecutionStatus) -> TransitionError {
    if from.is_terminal() {
        TransitionError::AlreadyTerminal { from, to }
    } else {
        TransitionError::Invalid { from, to }
    }
}
