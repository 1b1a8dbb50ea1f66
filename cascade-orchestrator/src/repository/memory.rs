//! In-memory execution store
//!
//! Keeps every record in process memory behind one mutex. Used when no
//! database is configured and by the engine tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use cascade_core::domain::execution::{
    ExecutionStatus, JobExecution, PipelineExecution, StageExecution,
};
use uuid::Uuid;

use super::{ExecutionStore, Result, StoreError, rejected_transition};

#[derive(Default)]
struct State {
    pipelines: HashMap<Uuid, PipelineExecution>,
    stages: HashMap<Uuid, StageExecution>,
    jobs: HashMap<Uuid, JobExecution>,
    /// Job ids per stage, in creation order
    stage_jobs: HashMap<Uuid, Vec<Uuid>>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn create_pipeline_execution(
        &self,
        pipeline_name: &str,
        commit_hash: Option<String>,
        is_local: bool,
    ) -> Result<PipelineExecution> {
        let mut state = self.lock();
        let run_number = state
            .pipelines
            .values()
            .filter(|p| p.pipeline_name == pipeline_name)
            .map(|p| p.run_number)
            .max()
            .unwrap_or(0)
            + 1;

        let execution = PipelineExecution::new(pipeline_name, run_number, commit_hash, is_local);
        state.pipelines.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn update_pipeline_execution(&self, execution: &PipelineExecution) -> Result<()> {
        let mut state = self.lock();
        let slot = state
            .pipelines
            .get_mut(&execution.id)
            .ok_or(StoreError::NotFound {
                entity: "pipeline execution",
                id: execution.id,
            })?;
        *slot = execution.clone();
        Ok(())
    }

    async fn find_pipeline_execution(&self, id: Uuid) -> Result<Option<PipelineExecution>> {
        Ok(self.lock().pipelines.get(&id).cloned())
    }

    async fn find_pipeline_execution_by_run(
        &self,
        pipeline_name: &str,
        run_number: i32,
    ) -> Result<Option<PipelineExecution>> {
        Ok(self
            .lock()
            .pipelines
            .values()
            .find(|p| p.pipeline_name == pipeline_name && p.run_number == run_number)
            .cloned())
    }

    async fn list_pipeline_executions(&self, pipeline_name: &str) -> Result<Vec<PipelineExecution>> {
        let mut runs: Vec<_> = self
            .lock()
            .pipelines
            .values()
            .filter(|p| p.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.run_number.cmp(&a.run_number));
        Ok(runs)
    }

    async fn list_pipeline_names(&self) -> Result<Vec<String>> {
        let names: BTreeSet<String> = self
            .lock()
            .pipelines
            .values()
            .map(|p| p.pipeline_name.clone())
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn create_stage_execution(&self, stage: &StageExecution) -> Result<()> {
        let mut state = self.lock();
        if !state.pipelines.contains_key(&stage.pipeline_execution_id) {
            return Err(StoreError::NotFound {
                entity: "pipeline execution",
                id: stage.pipeline_execution_id,
            });
        }
        state.stages.insert(stage.id, stage.clone());
        state.stage_jobs.entry(stage.id).or_default();
        Ok(())
    }

    async fn update_stage_execution(&self, stage: &StageExecution) -> Result<()> {
        let mut state = self.lock();
        let slot = state.stages.get_mut(&stage.id).ok_or(StoreError::NotFound {
            entity: "stage execution",
            id: stage.id,
        })?;
        *slot = stage.clone();
        Ok(())
    }

    async fn find_stage_execution(&self, id: Uuid) -> Result<Option<StageExecution>> {
        Ok(self.lock().stages.get(&id).cloned())
    }

    async fn find_stages_by_pipeline_execution(
        &self,
        pipeline_execution_id: Uuid,
    ) -> Result<Vec<StageExecution>> {
        let mut stages: Vec<_> = self
            .lock()
            .stages
            .values()
            .filter(|s| s.pipeline_execution_id == pipeline_execution_id)
            .cloned()
            .collect();
        stages.sort_by_key(|s| s.execution_order);
        Ok(stages)
    }

    async fn create_job_executions(&self, jobs: &[JobExecution]) -> Result<()> {
        let mut state = self.lock();
        for job in jobs {
            if !state.stages.contains_key(&job.stage_execution_id) {
                return Err(StoreError::NotFound {
                    entity: "stage execution",
                    id: job.stage_execution_id,
                });
            }
        }
        for job in jobs {
            state.jobs.insert(job.id, job.clone());
            state
                .stage_jobs
                .entry(job.stage_execution_id)
                .or_default()
                .push(job.id);
        }
        Ok(())
    }

    async fn find_job_execution(&self, id: Uuid) -> Result<Option<JobExecution>> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    async fn find_jobs_by_stage_execution(&self, stage_execution_id: Uuid) -> Result<Vec<JobExecution>> {
        let state = self.lock();
        let jobs = state
            .stage_jobs
            .get(&stage_execution_id)
            .map(|ids| ids.iter().filter_map(|id| state.jobs.get(id).cloned()).collect())
            .unwrap_or_default();
        Ok(jobs)
    }

    async fn transition_job(&self, id: Uuid, to: ExecutionStatus, logs: &str) -> Result<JobExecution> {
        let mut state = self.lock();
        let job = state.jobs.get_mut(&id).ok_or(StoreError::job_not_found(id))?;

        if !job.status.can_transition_to(to) {
            return Err(rejected_transition(job.status, to).into());
        }

        job.transition(to)?;
        job.logs.push_str(logs);
        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_numbers_increase_per_pipeline() {
        let store = InMemoryStore::new();
        let a1 = store.create_pipeline_execution("a", None, true).await.unwrap();
        let a2 = store.create_pipeline_execution("a", None, true).await.unwrap();
        let b1 = store.create_pipeline_execution("b", None, true).await.unwrap();

        assert_eq!((a1.run_number, a2.run_number, b1.run_number), (1, 2, 1));
        assert_eq!(store.list_pipeline_names().await.unwrap(), vec!["a", "b"]);

        let runs = store.list_pipeline_executions("a").await.unwrap();
        assert_eq!(runs[0].run_number, 2);
        assert_eq!(
            store.find_pipeline_execution_by_run("a", 1).await.unwrap().map(|p| p.id),
            Some(a1.id)
        );
    }

    #[tokio::test]
    async fn test_transition_job_is_compare_and_set() {
        let store = InMemoryStore::new();
        let pipeline = store.create_pipeline_execution("p", None, true).await.unwrap();
        let stage = StageExecution::new(pipeline.id, "build", 0);
        store.create_stage_execution(&stage).await.unwrap();
        let job = JobExecution::new(stage.id, "compile", false);
        store.create_job_executions(&[job.clone()]).await.unwrap();

        let running = store
            .transition_job(job.id, ExecutionStatus::Running, "")
            .await
            .unwrap();
        assert!(running.started_at.is_some());

        let err = store
            .transition_job(job.id, ExecutionStatus::Running, "")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transition(_)));

        let done = store
            .transition_job(job.id, ExecutionStatus::Success, "line\n")
            .await
            .unwrap();
        assert_eq!(done.logs, "line\n");

        let late = store
            .transition_job(job.id, ExecutionStatus::Canceled, "ignored")
            .await
            .unwrap_err();
        assert!(late.is_already_terminal());
        let stored = store.find_job_execution(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Success);
        assert_eq!(stored.logs, "line\n");
    }

    #[tokio::test]
    async fn test_jobs_listed_in_creation_order() {
        let store = InMemoryStore::new();
        let pipeline = store.create_pipeline_execution("p", None, true).await.unwrap();
        let stage = StageExecution::new(pipeline.id, "build", 0);
        store.create_stage_execution(&stage).await.unwrap();

        let jobs: Vec<_> = ["c", "a", "b"]
            .iter()
            .map(|name| JobExecution::new(stage.id, *name, false))
            .collect();
        store.create_job_executions(&jobs).await.unwrap();

        let names: Vec<_> = store
            .find_jobs_by_stage_execution(stage.id)
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.job_name)
            .collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_job_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .transition_job(Uuid::new_v4(), ExecutionStatus::Running, "")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
