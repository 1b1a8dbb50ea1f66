//! Stage actor
//!
//! One task per running stage. It owns the stage's [`ReadySet`], dispatches
//! jobs as they become ready, reacts to completions in arrival order and
//! finalizes the stage through the coordinator. The ready set is dropped and
//! the event channel deregistered when the actor returns.

use std::collections::HashMap;

use cascade_core::domain::definition::{JobDefinition, StageDefinition};
use cascade_core::domain::execution::{ExecutionStatus, JobExecution, StageExecution};
use cascade_core::dto::job::JobDispatch;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::Inner;
use crate::repository::StoreError;
use crate::service::coordinator::{self, StageVerdict};
use crate::service::{ReadySet, SchedulingError};

/// Event delivered to a stage actor
#[derive(Debug, Clone)]
pub enum StageEvent {
    JobCompleted {
        job_execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Final state of a stage, handed back to the pipeline task
#[derive(Debug, Clone)]
pub struct StageCompleted {
    pub stage_execution_id: Uuid,
    pub stage_name: String,
    pub status: ExecutionStatus,
}

#[derive(Debug, Error)]
enum StageFault {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("job dispatch queue is closed")]
    QueueClosed,

    #[error("stage event channel closed")]
    EventsClosed,
}

/// Runs a stage that is already RUNNING until it finishes
pub(crate) async fn run_stage(
    inner: &Inner,
    mut stage: StageExecution,
    definition: &StageDefinition,
    working_dir: Option<&str>,
) -> StageCompleted {
    let events = inner.router.register(stage.id);

    let mut actor = StageActor {
        inner,
        definition,
        working_dir,
        records: HashMap::new(),
    };
    let outcome = actor.drive(&mut stage, events).await;
    inner.router.deregister(stage.id);

    if let Err(fault) = outcome {
        error!(
            "Stage '{}' ({}) aborted: {}",
            stage.stage_name, stage.id, fault
        );
        abort(inner, &mut stage).await;
    }

    StageCompleted {
        stage_execution_id: stage.id,
        stage_name: stage.stage_name,
        status: stage.status,
    }
}

struct StageActor<'a> {
    inner: &'a Inner,
    definition: &'a StageDefinition,
    working_dir: Option<&'a str>,
    records: HashMap<Uuid, JobExecution>,
}

impl StageActor<'_> {
    async fn drive(
        &mut self,
        stage: &mut StageExecution,
        mut events: UnboundedReceiver<StageEvent>,
    ) -> Result<(), StageFault> {
        let jobs = self.inner.store.find_jobs_by_stage_execution(stage.id).await?;
        let mut ready = ReadySet::from_stage(self.definition, &jobs)?;
        self.records = jobs.into_iter().map(|j| (j.id, j)).collect();

        let seeded = ready.seed();
        if seeded.is_empty() {
            return Err(SchedulingError::NothingRunnable.into());
        }
        info!(
            "Stage '{}' started with {} job(s), {} ready",
            stage.stage_name,
            self.records.len(),
            seeded.len()
        );
        for id in seeded {
            self.dispatch(id).await?;
        }

        loop {
            let StageEvent::JobCompleted {
                job_execution_id,
                status,
            } = events.recv().await.ok_or(StageFault::EventsClosed)?;

            if !ready.knows(job_execution_id) {
                error!(
                    "Scheduling invariant violated: stage '{}' ({}) got a completion for unknown job {}",
                    stage.stage_name, stage.id, job_execution_id
                );
                continue;
            }

            let allow_failure = self
                .records
                .get(&job_execution_id)
                .is_some_and(|j| j.allow_failure);

            if status.satisfies_dependency(allow_failure) {
                match ready.on_job_completed(job_execution_id) {
                    Ok(next) => {
                        for id in next {
                            self.dispatch(id).await?;
                        }
                    }
                    Err(e) => error!(
                        "Scheduling invariant violated in stage '{}' ({}): {}",
                        stage.stage_name, stage.id, e
                    ),
                }
            }

            let current = self.inner.store.find_jobs_by_stage_execution(stage.id).await?;
            let verdict = coordinator::evaluate(&current);
            if verdict == StageVerdict::Waiting {
                continue;
            }

            if let StageVerdict::Failed { failed_jobs } = &verdict {
                warn!(
                    "Stage '{}' failed because of job(s): {}",
                    stage.stage_name,
                    failed_jobs.join(", ")
                );
            }
            coordinator::finalize(self.inner.store.as_ref(), stage, &verdict).await?;
            return Ok(());
        }
    }

    async fn dispatch(&self, job_execution_id: Uuid) -> Result<(), StageFault> {
        let record = self
            .records
            .get(&job_execution_id)
            .ok_or(SchedulingError::UnknownJob(job_execution_id))?;
        let job = self
            .job_definition(&record.job_name)
            .ok_or_else(|| SchedulingError::MissingExecution(record.job_name.clone()))?;

        let dispatch = JobDispatch {
            job_execution_id,
            stage_execution_id: record.stage_execution_id,
            job_name: record.job_name.clone(),
            image: job.image.clone(),
            script: job.script.clone(),
            working_dir: self.working_dir.map(str::to_string),
            allow_failure: record.allow_failure,
        };

        debug!("Dispatching job {} ({})", record.job_name, job_execution_id);
        self.inner
            .dispatcher
            .send(dispatch)
            .await
            .map_err(|_| StageFault::QueueClosed)
    }

    fn job_definition(&self, name: &str) -> Option<&JobDefinition> {
        self.definition.jobs.iter().find(|j| j.name == name)
    }
}

/// Fails a stage whose actor could not finish normally
async fn abort(inner: &Inner, stage: &mut StageExecution) {
    let verdict = StageVerdict::Failed {
        failed_jobs: Vec::new(),
    };
    if let Err(e) = coordinator::finalize(inner.store.as_ref(), stage, &verdict).await {
        error!(
            "Failed to record failure of stage '{}' ({}): {}",
            stage.stage_name, stage.id, e
        );
        if !stage.status.is_terminal() {
            stage.status = ExecutionStatus::Failed;
        }
    }
}
