//! Pipeline Execution Repository
//!
//! Handles all database operations related to pipeline runs.

use cascade_core::domain::execution::{ExecutionStatus, PipelineExecution};
use sqlx::PgPool;
use uuid::Uuid;

use super::StoreError;

/// Attempts at allocating a run number before giving up on concurrent inserts
const RUN_NUMBER_ATTEMPTS: usize = 3;

/// Create a new pipeline execution with the next run number for its pipeline
pub async fn create(
    pool: &PgPool,
    pipeline_name: &str,
    commit_hash: Option<String>,
    is_local: bool,
) -> Result<PipelineExecution, StoreError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut execution = PipelineExecution::new(pipeline_name, 0, commit_hash.clone(), is_local);

        let inserted = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO pipeline_executions
                (id, pipeline_name, run_number, commit_hash, is_local, status, created_at)
            SELECT $1, $2, COALESCE(MAX(run_number), 0) + 1, $3, $4, $5, $6
            FROM pipeline_executions
            WHERE pipeline_name = $2
            RETURNING run_number
            "#,
        )
        .bind(execution.id)
        .bind(&execution.pipeline_name)
        .bind(&execution.commit_hash)
        .bind(execution.is_local)
        .bind(execution.status.as_str())
        .bind(execution.created_at)
        .fetch_one(pool)
        .await;

        match inserted {
            Ok(run_number) => {
                execution.run_number = run_number;
                return Ok(execution);
            }
            Err(sqlx::Error::Database(e))
                if e.is_unique_violation() && attempt < RUN_NUMBER_ATTEMPTS =>
            {
                tracing::debug!(
                    "Run number collision for pipeline {}, retrying",
                    pipeline_name
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Persist status and timestamps
pub async fn update(pool: &PgPool, execution: &PipelineExecution) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE pipeline_executions
        SET status = $1, started_at = $2, completed_at = $3
        WHERE id = $4
        "#,
    )
    .bind(execution.status.as_str())
    .bind(execution.started_at)
    .bind(execution.completed_at)
    .bind(execution.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "pipeline execution",
            id: execution.id,
        });
    }

    Ok(())
}

/// Find a pipeline execution by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<PipelineExecution>, StoreError> {
    let row = sqlx::query_as::<_, PipelineExecutionRow>(
        r#"
        SELECT id, pipeline_name, run_number, commit_hash, is_local, status,
               created_at, started_at, completed_at
        FROM pipeline_executions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(PipelineExecution::try_from).transpose()
}

/// Find a run by pipeline name and run number
pub async fn find_by_run(
    pool: &PgPool,
    pipeline_name: &str,
    run_number: i32,
) -> Result<Option<PipelineExecution>, StoreError> {
    let row = sqlx::query_as::<_, PipelineExecutionRow>(
        r#"
        SELECT id, pipeline_name, run_number, commit_hash, is_local, status,
               created_at, started_at, completed_at
        FROM pipeline_executions
        WHERE pipeline_name = $1 AND run_number = $2
        "#,
    )
    .bind(pipeline_name)
    .bind(run_number)
    .fetch_optional(pool)
    .await?;

    row.map(PipelineExecution::try_from).transpose()
}

/// List the runs of a pipeline, newest first
pub async fn list_by_pipeline(
    pool: &PgPool,
    pipeline_name: &str,
) -> Result<Vec<PipelineExecution>, StoreError> {
    let rows = sqlx::query_as::<_, PipelineExecutionRow>(
        r#"
        SELECT id, pipeline_name, run_number, commit_hash, is_local, status,
               created_at, started_at, completed_at
        FROM pipeline_executions
        WHERE pipeline_name = $1
        ORDER BY run_number DESC
        "#,
    )
    .bind(pipeline_name)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PipelineExecution::try_from).collect()
}

/// List the names of pipelines with at least one run
pub async fn list_names(pool: &PgPool) -> Result<Vec<String>, StoreError> {
    let names = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT pipeline_name FROM pipeline_executions ORDER BY pipeline_name",
    )
    .fetch_all(pool)
    .await?;

    Ok(names)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineExecutionRow {
    id: Uuid,
    pipeline_name: String,
    run_number: i32,
    commit_hash: Option<String>,
    is_local: bool,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<PipelineExecutionRow> for PipelineExecution {
    type Error = StoreError;

    fn try_from(row: PipelineExecutionRow) -> Result<Self, Self::Error> {
        Ok(PipelineExecution {
            id: row.id,
            pipeline_name: row.pipeline_name,
            run_number: row.run_number,
            commit_hash: row.commit_hash,
            is_local: row.is_local,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

pub(crate) fn parse_status(value: &str) -> Result<ExecutionStatus, StoreError> {
    ExecutionStatus::parse(value)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown status '{}'", value)))
}
