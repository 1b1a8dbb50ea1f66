//! Worker pool
//!
//! Pulls ready jobs off the dispatch queue and runs each one in its own task,
//! never more than `max_parallel_jobs` at once.
//!
//! Admission is a single critical section over the in-flight set: a job id
//! already in flight is a duplicate delivery and is skipped; a full pool hands
//! the message back so the consumer can retry it once a slot frees. Once
//! admitted, a job always ends with a reported terminal status, whatever the
//! backend does (error, timeout or panic), and its in-flight entry is removed
//! by a guard on every path.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use cascade_core::domain::execution::ExecutionStatus;
use cascade_core::domain::log::LogEntry;
use cascade_core::dto::job::{JobCompletion, JobDispatch};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{ExecutionBackend, ExecutionOutcome};
use crate::config::Config;
use crate::reporter::JobReporter;
use crate::service::{InMemoryLogBuffer, LogBufferService};

/// Result of offering a job to the pool
#[derive(Debug)]
pub enum Admission {
    /// The job was admitted and is starting
    Accepted,
    /// The job is already being processed
    Duplicate,
    /// No free slot; the message is handed back for redelivery
    AtCapacity(JobDispatch),
}

/// Bounded-concurrency job consumer
#[derive(Clone)]
pub struct WorkerPool {
    config: Config,
    backend: Arc<dyn ExecutionBackend>,
    reporter: Arc<dyn JobReporter>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    slot_freed: Arc<Notify>,
}

/// Removes a job from the in-flight set and frees its slot when dropped
struct InFlightGuard {
    job_execution_id: Uuid,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    permit: Option<OwnedSemaphorePermit>,
    slot_freed: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.job_execution_id);
        drop(self.permit.take());
        self.slot_freed.notify_one();
    }
}

impl WorkerPool {
    /// Creates a new worker pool
    pub fn new(
        config: Config,
        backend: Arc<dyn ExecutionBackend>,
        reporter: Arc<dyn JobReporter>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs));
        Self {
            config,
            backend,
            reporter,
            semaphore,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            slot_freed: Arc::new(Notify::new()),
        }
    }

    /// Consumes the dispatch queue until every sender is dropped
    ///
    /// A message that finds the pool full waits here until a slot frees, so
    /// later messages stay queued behind it.
    pub async fn run(&self, mut receiver: mpsc::Receiver<JobDispatch>) {
        info!(
            "Starting worker pool (max parallel jobs: {})",
            self.config.max_parallel_jobs
        );

        while let Some(dispatch) = receiver.recv().await {
            let mut pending = dispatch;
            loop {
                match self.offer(pending) {
                    Admission::Accepted | Admission::Duplicate => break,
                    Admission::AtCapacity(returned) => {
                        debug!(
                            "Max parallel jobs reached, holding job {} until a slot frees",
                            returned.job_execution_id
                        );
                        pending = returned;
                        self.slot_freed.notified().await;
                    }
                }
            }
        }

        info!("Dispatch queue closed, worker pool stopping");
    }

    /// Admits a job if it is not already in flight and a slot is free
    pub fn offer(&self, dispatch: JobDispatch) -> Admission {
        let job_execution_id = dispatch.job_execution_id;

        let permit = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

            if in_flight.contains(&job_execution_id) {
                warn!("Job {} is already being processed, skipping", job_execution_id);
                return Admission::Duplicate;
            }

            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                return Admission::AtCapacity(dispatch);
            };

            in_flight.insert(job_execution_id);
            permit
        };

        let guard = InFlightGuard {
            job_execution_id,
            in_flight: Arc::clone(&self.in_flight),
            permit: Some(permit),
            slot_freed: Arc::clone(&self.slot_freed),
        };

        let pool = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            pool.process(dispatch).await;
        });

        debug!("Job {} admitted", job_execution_id);
        Admission::Accepted
    }

    /// Snapshot of the job ids currently in flight
    pub fn active_jobs(&self) -> Vec<Uuid> {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Runs one admitted job through its lifecycle
    async fn process(&self, dispatch: JobDispatch) {
        let job_id = dispatch.job_execution_id;
        let logs = InMemoryLogBuffer::new();

        match self.reporter.start_job(job_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    "Job {} ({}) is no longer pending, not running it",
                    job_id, dispatch.job_name
                );
                return;
            }
            Err(e) => {
                error!("Failed to mark job {} as running: {:#}", job_id, e);
                logs.add_entry(LogEntry::error(format!("Failed to start job: {:#}", e)));
                self.report(&dispatch, ExecutionStatus::Failed, &logs).await;
                return;
            }
        }

        info!(
            "Starting execution of job {} ({}) in {}",
            job_id, dispatch.job_name, dispatch.image
        );
        logs.add_entry(LogEntry::info(format!(
            "Starting job '{}' in image {}",
            dispatch.job_name, dispatch.image
        )));

        let status = self.execute(&dispatch, &logs).await;
        let status = self.apply_tolerance(&dispatch, status, &logs);

        logs.add_entry(LogEntry::info(format!("Job finished with status {}", status)));
        info!("Job {} completed with status: {}", job_id, status);

        self.report(&dispatch, status, &logs).await;
    }

    /// Invokes the backend and maps every way it can end to a terminal status
    async fn execute(&self, dispatch: &JobDispatch, logs: &InMemoryLogBuffer) -> ExecutionStatus {
        let working_dir = self.working_dir_for(dispatch);
        let backend = Arc::clone(&self.backend);
        let image = dispatch.image.clone();
        let script = dispatch.script.clone();

        let mut handle =
            tokio::spawn(async move { backend.execute(&image, &script, &working_dir).await });

        let joined = match self.config.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    warn!(
                        "Job {} timed out after {:?}",
                        dispatch.job_execution_id, limit
                    );
                    logs.add_entry(LogEntry::error(format!(
                        "Job timed out after {}s",
                        limit.as_secs()
                    )));
                    return ExecutionStatus::Failed;
                }
            },
            None => (&mut handle).await,
        };

        match joined {
            Ok(Ok(outcome)) => self.outcome_status(dispatch, outcome, logs),
            Ok(Err(e)) => {
                error!(
                    "Execution backend failed for job {}: {:#}",
                    dispatch.job_execution_id, e
                );
                logs.add_entry(LogEntry::error(format!("Execution backend error: {:#}", e)));
                ExecutionStatus::Failed
            }
            Err(e) => {
                error!(
                    "Job task for {} panicked or was aborted: {}",
                    dispatch.job_execution_id, e
                );
                logs.add_entry(LogEntry::error(format!("Job execution aborted: {}", e)));
                ExecutionStatus::Failed
            }
        }
    }

    fn outcome_status(
        &self,
        dispatch: &JobDispatch,
        outcome: ExecutionOutcome,
        logs: &InMemoryLogBuffer,
    ) -> ExecutionStatus {
        logs.extend(outcome.logs);

        if outcome.status.is_terminal() {
            return outcome.status;
        }

        error!(
            "Execution backend returned non-terminal status {} for job {}",
            outcome.status, dispatch.job_execution_id
        );
        logs.add_entry(LogEntry::error(format!(
            "Execution backend returned non-terminal status {}",
            outcome.status
        )));
        ExecutionStatus::Failed
    }

    /// Optionally rewrites a tolerated failure as SUCCESS
    fn apply_tolerance(
        &self,
        dispatch: &JobDispatch,
        status: ExecutionStatus,
        logs: &InMemoryLogBuffer,
    ) -> ExecutionStatus {
        if status == ExecutionStatus::Failed && dispatch.allow_failure {
            logs.add_entry(LogEntry::warning("Job failed but is allowed to fail"));
            if self.config.report_tolerated_failure_as_success {
                return ExecutionStatus::Success;
            }
        }
        status
    }

    async fn report(&self, dispatch: &JobDispatch, status: ExecutionStatus, logs: &InMemoryLogBuffer) {
        let completion = JobCompletion {
            job_execution_id: dispatch.job_execution_id,
            stage_execution_id: dispatch.stage_execution_id,
            status,
            logs: logs.drain(),
        };

        if let Err(e) = self.reporter.complete_job(completion).await {
            error!(
                "Failed to report completion of job {}: {:#}",
                dispatch.job_execution_id, e
            );
        }
    }

    fn working_dir_for(&self, dispatch: &JobDispatch) -> String {
        match &dispatch.working_dir {
            Some(dir) if !dir.trim().is_empty() => dir.clone(),
            _ => format!(
                "{}/{}",
                self.config.workspace_base.trim_end_matches('/'),
                dispatch.job_execution_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

    /// Backend whose behavior is chosen by the job's image name
    struct ScriptedBackend {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl ExecutionBackend for ScriptedBackend {
        async fn execute(
            &self,
            image: &str,
            script: &[String],
            _working_dir: &str,
        ) -> Result<ExecutionOutcome> {
            match image {
                "ok" => Ok(ExecutionOutcome::success(
                    script.iter().map(LogEntry::info).collect(),
                )),
                "fail" => Ok(ExecutionOutcome::failed(Some(1), vec![LogEntry::error("boom")])),
                "error" => Err(anyhow::anyhow!("runtime not found")),
                "panic" => panic!("backend exploded"),
                "hang" => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                "gate" => {
                    self.release.notified().await;
                    Ok(ExecutionOutcome::success(vec![]))
                }
                other => Err(anyhow::anyhow!("unknown image {}", other)),
            }
        }
    }

    struct RecordingReporter {
        refuse_start: Mutex<HashSet<Uuid>>,
        started: Mutex<Vec<Uuid>>,
        completions: UnboundedSender<JobCompletion>,
    }

    #[async_trait]
    impl JobReporter for RecordingReporter {
        async fn start_job(&self, job_execution_id: Uuid) -> Result<bool> {
            if self.refuse_start.lock().unwrap().contains(&job_execution_id) {
                return Ok(false);
            }
            self.started.lock().unwrap().push(job_execution_id);
            Ok(true)
        }

        async fn complete_job(&self, completion: JobCompletion) -> Result<()> {
            let _ = self.completions.send(completion);
            Ok(())
        }
    }

    struct Harness {
        pool: WorkerPool,
        reporter: Arc<RecordingReporter>,
        completions: UnboundedReceiver<JobCompletion>,
        release: Arc<Notify>,
    }

    fn harness(config: Config) -> Harness {
        let release = Arc::new(Notify::new());
        let (tx, rx) = unbounded_channel();
        let reporter = Arc::new(RecordingReporter {
            refuse_start: Mutex::new(HashSet::new()),
            started: Mutex::new(Vec::new()),
            completions: tx,
        });
        let backend = Arc::new(ScriptedBackend {
            release: Arc::clone(&release),
        });
        let pool = WorkerPool::new(config, backend, reporter.clone());
        Harness {
            pool,
            reporter,
            completions: rx,
            release,
        }
    }

    fn dispatch(image: &str, allow_failure: bool) -> JobDispatch {
        JobDispatch {
            job_execution_id: Uuid::new_v4(),
            stage_execution_id: Uuid::new_v4(),
            job_name: format!("{}-job", image),
            image: image.to_string(),
            script: vec!["echo hello".to_string()],
            working_dir: Some("/tmp/cascade-test".to_string()),
            allow_failure,
        }
    }

    async fn next_completion(rx: &mut UnboundedReceiver<JobCompletion>) -> JobCompletion {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for completion")
            .expect("reporter dropped")
    }

    #[tokio::test]
    async fn test_successful_job_reports_success_with_logs() {
        let mut h = harness(Config::default());
        let job = dispatch("ok", false);
        let id = job.job_execution_id;

        assert!(matches!(h.pool.offer(job), Admission::Accepted));
        let completion = next_completion(&mut h.completions).await;

        assert_eq!(completion.job_execution_id, id);
        assert_eq!(completion.status, ExecutionStatus::Success);
        assert!(completion.logs.iter().any(|e| e.message == "echo hello"));
        assert_eq!(h.reporter.started.lock().unwrap().as_slice(), &[id]);
    }

    #[tokio::test]
    async fn test_failed_job_reports_true_status_by_default() {
        let mut h = harness(Config::default());
        h.pool.offer(dispatch("fail", true));
        let completion = next_completion(&mut h.completions).await;
        assert_eq!(completion.status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_tolerated_failure_rewritten_when_enabled() {
        let config = Config {
            report_tolerated_failure_as_success: true,
            ..Config::default()
        };
        let mut h = harness(config);

        h.pool.offer(dispatch("fail", true));
        assert_eq!(
            next_completion(&mut h.completions).await.status,
            ExecutionStatus::Success
        );

        h.pool.offer(dispatch("fail", false));
        assert_eq!(
            next_completion(&mut h.completions).await.status,
            ExecutionStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_backend_error_and_panic_become_failed() {
        let mut h = harness(Config::default());

        h.pool.offer(dispatch("error", false));
        let completion = next_completion(&mut h.completions).await;
        assert_eq!(completion.status, ExecutionStatus::Failed);
        assert!(completion.logs.iter().any(|e| e.message.contains("runtime not found")));

        h.pool.offer(dispatch("panic", false));
        let completion = next_completion(&mut h.completions).await;
        assert_eq!(completion.status, ExecutionStatus::Failed);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.pool.active_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed() {
        let config = Config::default().with_job_timeout(Duration::from_millis(50));
        let mut h = harness(config);

        h.pool.offer(dispatch("hang", false));
        let completion = next_completion(&mut h.completions).await;
        assert_eq!(completion.status, ExecutionStatus::Failed);
        assert!(completion.logs.iter().any(|e| e.message.contains("timed out")));
    }

    #[tokio::test]
    async fn test_duplicate_and_capacity_admission() {
        let h = harness(Config::default().with_max_parallel_jobs(1));
        let first = dispatch("gate", false);

        assert!(matches!(h.pool.offer(first.clone()), Admission::Accepted));
        assert!(matches!(h.pool.offer(first.clone()), Admission::Duplicate));
        assert_eq!(h.pool.active_jobs(), vec![first.job_execution_id]);

        let second = dispatch("ok", false);
        let second_id = second.job_execution_id;
        match h.pool.offer(second) {
            Admission::AtCapacity(returned) => assert_eq!(returned.job_execution_id, second_id),
            other => panic!("expected AtCapacity, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_job_no_longer_pending_is_not_run() {
        let mut h = harness(Config::default());
        let job = dispatch("ok", false);
        h.reporter
            .refuse_start
            .lock()
            .unwrap()
            .insert(job.job_execution_id);

        h.pool.offer(job);
        let waited = tokio::time::timeout(Duration::from_millis(100), h.completions.recv()).await;
        assert!(waited.is_err(), "refused job must not report a completion");
        assert_eq!(h.pool.active_count(), 0);
    }

    #[tokio::test]
    async fn test_run_redelivers_when_slot_frees() {
        let mut h = harness(Config::default().with_max_parallel_jobs(1));
        let (tx, rx) = mpsc::channel(8);

        let gated = dispatch("gate", false);
        let queued = dispatch("ok", false);
        let queued_id = queued.job_execution_id;
        tx.send(gated).await.unwrap();
        tx.send(queued).await.unwrap();
        drop(tx);

        let pool = h.pool.clone();
        let runner = tokio::spawn(async move { pool.run(rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.pool.active_count(), 1);
        h.release.notify_one();

        let first = next_completion(&mut h.completions).await;
        let second = next_completion(&mut h.completions).await;
        assert_eq!(first.status, ExecutionStatus::Success);
        assert_eq!(second.job_execution_id, queued_id);

        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_working_dir_falls_back_to_workspace_base() {
        let h = harness(Config::default());
        let mut job = dispatch("ok", false);
        job.working_dir = None;
        assert_eq!(
            h.pool.working_dir_for(&job),
            format!("/tmp/cascade/{}", job.job_execution_id)
        );
    }
}
