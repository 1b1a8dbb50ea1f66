//! Stage Completion Coordinator
//!
//! Decides when a stage is finished and with which status, and applies that
//! decision to the store.

use cascade_core::domain::execution::{ExecutionStatus, JobExecution, StageExecution};
use cascade_core::domain::log::LogEntry;

use crate::repository::{ExecutionStore, Result};

/// Outcome of looking at a stage's jobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageVerdict {
    /// Some job is still pending or running
    Waiting,
    Succeeded,
    /// At least one job failed without allow-failure
    Failed { failed_jobs: Vec<String> },
}

impl StageVerdict {
    pub fn status(&self) -> Option<ExecutionStatus> {
        match self {
            Self::Waiting => None,
            Self::Succeeded => Some(ExecutionStatus::Success),
            Self::Failed { .. } => Some(ExecutionStatus::Failed),
        }
    }
}

/// Evaluates a stage from the current state of its jobs
///
/// A blocking failure decides the stage at once, even while siblings are
/// still pending or running; those are canceled by [`finalize`].
pub fn evaluate(jobs: &[JobExecution]) -> StageVerdict {
    let failed_jobs: Vec<String> = jobs
        .iter()
        .filter(|j| j.is_blocking_failure())
        .map(|j| j.job_name.clone())
        .collect();

    if !failed_jobs.is_empty() {
        return StageVerdict::Failed { failed_jobs };
    }

    if jobs.iter().any(|j| !j.status.is_terminal()) {
        return StageVerdict::Waiting;
    }

    StageVerdict::Succeeded
}

/// Applies a final verdict to the stage record
///
/// On failure every sibling that is still pending or running is canceled
/// first. Returns the canceled jobs. Does nothing for [`StageVerdict::Waiting`].
pub async fn finalize(
    store: &dyn ExecutionStore,
    stage: &mut StageExecution,
    verdict: &StageVerdict,
) -> Result<Vec<JobExecution>> {
    let Some(status) = verdict.status() else {
        return Ok(Vec::new());
    };

    let mut canceled = Vec::new();
    if let StageVerdict::Failed { failed_jobs } = verdict {
        let reason = if failed_jobs.is_empty() {
            format!("Canceled: stage '{}' failed", stage.stage_name)
        } else {
            format!(
                "Canceled: stage '{}' failed because of {}",
                stage.stage_name,
                failed_jobs.join(", ")
            )
        };
        let note = LogEntry::warning(reason).render();

        for job in store.find_jobs_by_stage_execution(stage.id).await? {
            if job.status.is_terminal() {
                continue;
            }
            match store
                .transition_job(job.id, ExecutionStatus::Canceled, &format!("{}\n", note))
                .await
            {
                Ok(job) => {
                    tracing::info!("Canceled job {} ({})", job.job_name, job.id);
                    canceled.push(job);
                }
                Err(e) if e.is_already_terminal() => {
                    tracing::debug!("Job {} finished before it could be canceled", job.id);
                }
                Err(e) => return Err(e),
            }
        }
    }

    stage.transition(status)?;
    store.update_stage_execution(stage).await?;

    tracing::info!(
        "Stage '{}' ({}) finished with status {}",
        stage.stage_name,
        stage.id,
        status
    );

    Ok(canceled)
}
