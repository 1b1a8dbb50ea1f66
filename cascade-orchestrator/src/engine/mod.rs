//! Orchestration engine
//!
//! Turns a validated pipeline definition into a running pipeline execution.
//!
//! Each run gets a pipeline task that walks the stages in order. Each running
//! stage gets an actor that owns its scheduling state and receives job
//! completions over its own channel. Ready jobs go to the worker pool through
//! the dispatch queue; the pool reports back through [`JobReporter`], which
//! this type implements over the store and the [`CompletionRouter`].

pub mod pipeline;
pub mod router;
pub mod stage;

use std::sync::Arc;

use async_trait::async_trait;
use cascade_core::ValidationReport;
use cascade_core::domain::definition::PipelineDefinition;
use cascade_core::domain::execution::{ExecutionStatus, PipelineExecution};
use cascade_core::domain::log::render_entries;
use cascade_core::dto::job::{JobCompletion, JobDispatch};
use cascade_core::dto::pipeline::RunRequest;
use cascade_runner::JobReporter;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use router::CompletionRouter;
pub use stage::{StageCompleted, StageEvent};

use crate::repository::{ExecutionStore, StoreError};
use crate::service::pipeline_service;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("pipeline is invalid:\n{0}")]
    Invalid(ValidationReport),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub(crate) struct Inner {
    pub(crate) store: Arc<dyn ExecutionStore>,
    pub(crate) dispatcher: mpsc::Sender<JobDispatch>,
    pub(crate) router: CompletionRouter,
}

/// A started run and the task driving it
pub struct RunHandle {
    pub execution: PipelineExecution,
    /// Resolves to the execution record in its final state
    pub task: JoinHandle<PipelineExecution>,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn ExecutionStore>, dispatcher: mpsc::Sender<JobDispatch>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                dispatcher,
                router: CompletionRouter::new(),
            }),
        }
    }

    pub fn store(&self) -> Arc<dyn ExecutionStore> {
        Arc::clone(&self.inner.store)
    }

    /// Validates the pipeline, creates its execution and starts running it
    ///
    /// Nothing is stored when validation fails.
    pub async fn start_run(
        &self,
        definition: PipelineDefinition,
        request: RunRequest,
    ) -> Result<RunHandle, OrchestratorError> {
        pipeline_service::validate(&definition).map_err(OrchestratorError::Invalid)?;

        let execution = self
            .inner
            .store
            .create_pipeline_execution(&definition.name, request.commit_hash, request.is_local)
            .await?;

        info!(
            "Created run #{} of pipeline '{}' ({})",
            execution.run_number, execution.pipeline_name, execution.id
        );

        let inner = Arc::clone(&self.inner);
        let record = execution.clone();
        let working_dir = request.working_dir;
        let task = tokio::spawn(async move {
            pipeline::run_pipeline(&inner, definition, record, working_dir).await
        });

        Ok(RunHandle { execution, task })
    }

    /// Starts a run and returns its PENDING execution record
    pub async fn trigger_run(
        &self,
        definition: PipelineDefinition,
        request: RunRequest,
    ) -> Result<PipelineExecution, OrchestratorError> {
        Ok(self.start_run(definition, request).await?.execution)
    }
}

#[async_trait]
impl JobReporter for Orchestrator {
    async fn start_job(&self, job_execution_id: Uuid) -> anyhow::Result<bool> {
        match self
            .inner
            .store
            .transition_job(job_execution_id, ExecutionStatus::Running, "")
            .await
        {
            Ok(_) => Ok(true),
            Err(StoreError::Transition(e)) => {
                info!("Job {} will not start: {}", job_execution_id, e);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn complete_job(&self, completion: JobCompletion) -> anyhow::Result<()> {
        let logs = render_entries(&completion.logs);

        let job = match self
            .inner
            .store
            .transition_job(completion.job_execution_id, completion.status, &logs)
            .await
        {
            Ok(job) => job,
            Err(e) if e.is_already_terminal() => {
                warn!(
                    "Ignoring late completion of job {}: {}",
                    completion.job_execution_id, e
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let delivered = self.inner.router.publish(
            job.stage_execution_id,
            StageEvent::JobCompleted {
                job_execution_id: job.id,
                status: job.status,
            },
        );
        if !delivered {
            debug!(
                "Stage {} is no longer active, completion of job {} not routed",
                job.stage_execution_id, job.id
            );
        }

        Ok(())
    }
}
