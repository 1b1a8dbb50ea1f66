//! PostgreSQL execution store
//!
//! Thin adapter from [`ExecutionStore`] to the per-entity repositories.

use async_trait::async_trait;
use cascade_core::domain::execution::{
    ExecutionStatus, JobExecution, PipelineExecution, StageExecution,
};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    ExecutionStore, Result, job_execution_repository, pipeline_execution_repository,
    stage_execution_repository,
};

#[derive(Clone)]
pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn create_pipeline_execution(
        &self,
        pipeline_name: &str,
        commit_hash: Option<String>,
        is_local: bool,
    ) -> Result<PipelineExecution> {
        pipeline_execution_repository::create(&self.pool, pipeline_name, commit_hash, is_local).await
    }

    async fn update_pipeline_execution(&self, execution: &PipelineExecution) -> Result<()> {
        pipeline_execution_repository::update(&self.pool, execution).await
    }

    async fn find_pipeline_execution(&self, id: Uuid) -> Result<Option<PipelineExecution>> {
        pipeline_execution_repository::find_by_id(&self.pool, id).await
    }

    async fn find_pipeline_execution_by_run(
        &self,
        pipeline_name: &str,
        run_number: i32,
    ) -> Result<Option<PipelineExecution>> {
        pipeline_execution_repository::find_by_run(&self.pool, pipeline_name, run_number).await
    }

    async fn list_pipeline_executions(&self, pipeline_name: &str) -> Result<Vec<PipelineExecution>> {
        pipeline_execution_repository::list_by_pipeline(&self.pool, pipeline_name).await
    }

    async fn list_pipeline_names(&self) -> Result<Vec<String>> {
        pipeline_execution_repository::list_names(&self.pool).await
    }

    async fn create_stage_execution(&self, stage: &StageExecution) -> Result<()> {
        stage_execution_repository::create(&self.pool, stage).await
    }

    async fn update_stage_execution(&self, stage: &StageExecution) -> Result<()> {
        stage_execution_repository::update(&self.pool, stage).await
    }

    async fn find_stage_execution(&self, id: Uuid) -> Result<Option<StageExecution>> {
        stage_execution_repository::find_by_id(&self.pool, id).await
    }

    async fn find_stages_by_pipeline_execution(
        &self,
        pipeline_execution_id: Uuid,
    ) -> Result<Vec<StageExecution>> {
        stage_execution_repository::find_by_pipeline_execution(&self.pool, pipeline_execution_id)
            .await
    }

    async fn create_job_executions(&self, jobs: &[JobExecution]) -> Result<()> {
        job_execution_repository::create_many(&self.pool, jobs).await
    }

    async fn find_job_execution(&self, id: Uuid) -> Result<Option<JobExecution>> {
        job_execution_repository::find_by_id(&self.pool, id).await
    }

    async fn find_jobs_by_stage_execution(&self, stage_execution_id: Uuid) -> Result<Vec<JobExecution>> {
        job_execution_repository::find_by_stage_execution(&self.pool, stage_execution_id).await
    }

    async fn transition_job(&self, id: Uuid, to: ExecutionStatus, logs: &str) -> Result<JobExecution> {
        job_execution_repository::transition(&self.pool, id, to, logs).await
    }
}
