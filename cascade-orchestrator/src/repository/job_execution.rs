//! Job Execution Repository
//!
//! Handles all database operations related to job runs. Status changes go
//! through [`transition`], a conditional update that only applies when the
//! current status allows the move.

use cascade_core::domain::execution::{ExecutionStatus, JobExecution};
use sqlx::PgPool;
use uuid::Uuid;

use super::pipeline_execution::parse_status;
use super::{StoreError, allowed_sources, rejected_transition};

/// Insert the jobs of a stage in one transaction
pub async fn create_many(pool: &PgPool, jobs: &[JobExecution]) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;

    for (position, job) in jobs.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO job_executions
                (id, stage_execution_id, job_name, position, status, allow_failure, started_at, completed_at, logs)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(job.id)
        .bind(job.stage_execution_id)
        .bind(&job.job_name)
        .bind(position as i32)
        .bind(job.status.as_str())
        .bind(job.allow_failure)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.logs)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Find a job execution by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<JobExecution>, StoreError> {
    let row = sqlx::query_as::<_, JobExecutionRow>(
        r#"
        SELECT id, stage_execution_id, job_name, status, allow_failure,
               started_at, completed_at, logs
        FROM job_executions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(JobExecution::try_from).transpose()
}

/// Find the jobs of a stage in declaration order
pub async fn find_by_stage_execution(
    pool: &PgPool,
    stage_execution_id: Uuid,
) -> Result<Vec<JobExecution>, StoreError> {
    let rows = sqlx::query_as::<_, JobExecutionRow>(
        r#"
        SELECT id, stage_execution_id, job_name, status, allow_failure,
               started_at, completed_at, logs
        FROM job_executions
        WHERE stage_execution_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(stage_execution_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(JobExecution::try_from).collect()
}

/// Move a job to `to` if its current status allows it, appending `logs`
pub async fn transition(
    pool: &PgPool,
    id: Uuid,
    to: ExecutionStatus,
    logs: &str,
) -> Result<JobExecution, StoreError> {
    let sources: Vec<&str> = allowed_sources(to).into_iter().map(|s| s.as_str()).collect();
    let now = chrono::Utc::now();

    let row = sqlx::query_as::<_, JobExecutionRow>(
        r#"
        UPDATE job_executions
        SET status = $1,
            started_at = CASE WHEN $2 THEN COALESCE(started_at, $4) ELSE started_at END,
            completed_at = CASE WHEN $3 THEN $4 ELSE completed_at END,
            logs = logs || $5
        WHERE id = $6 AND status = ANY($7)
        RETURNING id, stage_execution_id, job_name, status, allow_failure,
                  started_at, completed_at, logs
        "#,
    )
    .bind(to.as_str())
    .bind(to == ExecutionStatus::Running)
    .bind(to.is_terminal())
    .bind(now)
    .bind(logs)
    .bind(id)
    .bind(sources)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => row.try_into(),
        None => match find_by_id(pool, id).await? {
            Some(current) => Err(rejected_transition(current.status, to).into()),
            None => Err(StoreError::job_not_found(id)),
        },
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobExecutionRow {
    id: Uuid,
    stage_execution_id: Uuid,
    job_name: String,
    status: String,
    allow_failure: bool,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    logs: String,
}

impl TryFrom<JobExecutionRow> for JobExecution {
    type Error = StoreError;

    fn try_from(row: JobExecutionRow) -> Result<Self, Self::Error> {
        Ok(JobExecution {
            id: row.id,
            stage_execution_id: row.stage_execution_id,
            job_name: row.job_name,
            status: parse_status(&row.status)?,
            allow_failure: row.allow_failure,
            started_at: row.started_at,
            completed_at: row.completed_at,
            logs: row.logs,
        })
    }
}
