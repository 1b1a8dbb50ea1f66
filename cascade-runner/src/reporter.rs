//! Job reporter
//!
//! The boundary between the worker pool and whatever owns execution state.
//! The orchestrator implements it over its store and completion router.

use anyhow::Result;
use async_trait::async_trait;
use cascade_core::dto::job::JobCompletion;
use uuid::Uuid;

#[async_trait]
pub trait JobReporter: Send + Sync {
    /// Marks the job RUNNING and records its start time
    ///
    /// Returns `false` when the job is no longer PENDING (canceled by a
    /// failing sibling, or already picked up), in which case it must not run.
    async fn start_job(&self, job_execution_id: Uuid) -> Result<bool>;

    /// Records the terminal status and logs and publishes the completion
    async fn complete_job(&self, completion: JobCompletion) -> Result<()>;
}
