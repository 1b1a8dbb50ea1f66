use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // One row per pipeline run
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_executions (
            id UUID PRIMARY KEY,
            pipeline_name VARCHAR(255) NOT NULL,
            run_number INTEGER NOT NULL,
            commit_hash VARCHAR(255),
            is_local BOOLEAN NOT NULL DEFAULT FALSE,
            status VARCHAR(20) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            UNIQUE (pipeline_name, run_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stage_executions (
            id UUID PRIMARY KEY,
            pipeline_execution_id UUID NOT NULL REFERENCES pipeline_executions(id) ON DELETE CASCADE,
            stage_name VARCHAR(255) NOT NULL,
            execution_order INTEGER NOT NULL,
            status VARCHAR(20) NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_executions (
            id UUID PRIMARY KEY,
            stage_execution_id UUID NOT NULL REFERENCES stage_executions(id) ON DELETE CASCADE,
            job_name VARCHAR(255) NOT NULL,
            position INTEGER NOT NULL,
            status VARCHAR(20) NOT NULL,
            allow_failure BOOLEAN NOT NULL DEFAULT FALSE,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            logs TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for report and scheduling queries
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_executions_name ON pipeline_executions(pipeline_name, run_number DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_stage_executions_pipeline ON stage_executions(pipeline_execution_id, execution_order)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_executions_stage ON job_executions(stage_execution_id, position)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
