//! Stage Execution Repository
//!
//! Handles all database operations related to stage runs.

use cascade_core::domain::execution::StageExecution;
use sqlx::PgPool;
use uuid::Uuid;

use super::StoreError;
use super::pipeline_execution::parse_status;

/// Insert a new stage execution
pub async fn create(pool: &PgPool, stage: &StageExecution) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO stage_executions
            (id, pipeline_execution_id, stage_name, execution_order, status, started_at, completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(stage.id)
    .bind(stage.pipeline_execution_id)
    .bind(&stage.stage_name)
    .bind(stage.execution_order)
    .bind(stage.status.as_str())
    .bind(stage.started_at)
    .bind(stage.completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist status and timestamps
pub async fn update(pool: &PgPool, stage: &StageExecution) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE stage_executions
        SET status = $1, started_at = $2, completed_at = $3
        WHERE id = $4
        "#,
    )
    .bind(stage.status.as_str())
    .bind(stage.started_at)
    .bind(stage.completed_at)
    .bind(stage.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "stage execution",
            id: stage.id,
        });
    }

    Ok(())
}

/// Find a stage execution by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<StageExecution>, StoreError> {
    let row = sqlx::query_as::<_, StageExecutionRow>(
        r#"
        SELECT id, pipeline_execution_id, stage_name, execution_order, status,
               started_at, completed_at
        FROM stage_executions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(StageExecution::try_from).transpose()
}

/// Find the stages of a run in execution order
pub async fn find_by_pipeline_execution(
    pool: &PgPool,
    pipeline_execution_id: Uuid,
) -> Result<Vec<StageExecution>, StoreError> {
    let rows = sqlx::query_as::<_, StageExecutionRow>(
        r#"
        SELECT id, pipeline_execution_id, stage_name, execution_order, status,
               started_at, completed_at
        FROM stage_executions
        WHERE pipeline_execution_id = $1
        ORDER BY execution_order ASC
        "#,
    )
    .bind(pipeline_execution_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(StageExecution::try_from).collect()
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct StageExecutionRow {
    id: Uuid,
    pipeline_execution_id: Uuid,
    stage_name: String,
    execution_order: i32,
    status: String,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<StageExecutionRow> for StageExecution {
    type Error = StoreError;

    fn try_from(row: StageExecutionRow) -> Result<Self, Self::Error> {
        Ok(StageExecution {
            id: row.id,
            pipeline_execution_id: row.pipeline_execution_id,
            stage_name: row.stage_name,
            execution_order: row.execution_order,
            status: parse_status(&row.status)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}
