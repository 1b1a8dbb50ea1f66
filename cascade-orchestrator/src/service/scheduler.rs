//! Dependency-Ready Scheduler
//!
//! Per-stage readiness tracking. A [`ReadySet`] is owned by exactly one stage
//! actor, so its mutations are serialized by ownership rather than a lock.

use std::collections::{HashMap, HashSet};

use cascade_core::domain::definition::StageDefinition;
use cascade_core::domain::execution::JobExecution;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("job {0} is not part of this stage")]
    UnknownJob(Uuid),

    #[error("no execution record for job '{0}'")]
    MissingExecution(String),

    #[error("no job in the stage can start")]
    NothingRunnable,
}

/// Readiness state of one running stage
#[derive(Debug, Default)]
pub struct ReadySet {
    /// Same-stage dependencies per job
    dependencies: HashMap<Uuid, Vec<Uuid>>,
    /// Declaration order, so ready lists are deterministic
    order: Vec<Uuid>,
    /// Jobs already handed out for dispatch
    queued: HashSet<Uuid>,
    /// Jobs whose completion satisfies their dependents
    completed: HashSet<Uuid>,
}

impl ReadySet {
    pub fn new(jobs: impl IntoIterator<Item = (Uuid, Vec<Uuid>)>) -> Self {
        let mut set = Self::default();
        for (id, deps) in jobs {
            set.order.push(id);
            set.dependencies.insert(id, deps);
        }
        set
    }

    /// Builds the set for a stage from its definition and execution records
    ///
    /// Dependencies naming a job outside the stage refer to an earlier stage,
    /// which finished before this one started, and are dropped.
    pub fn from_stage(stage: &StageDefinition, jobs: &[JobExecution]) -> Result<Self, SchedulingError> {
        let ids: HashMap<&str, Uuid> = jobs.iter().map(|j| (j.job_name.as_str(), j.id)).collect();

        let mut entries = Vec::with_capacity(stage.jobs.len());
        for job in &stage.jobs {
            let id = *ids
                .get(job.name.as_str())
                .ok_or_else(|| SchedulingError::MissingExecution(job.name.clone()))?;

            let deps = job
                .dependencies
                .iter()
                .filter_map(|name| ids.get(name.as_str()).copied())
                .collect();
            entries.push((id, deps));
        }

        Ok(Self::new(entries))
    }

    pub fn knows(&self, id: Uuid) -> bool {
        self.dependencies.contains_key(&id)
    }

    /// Jobs with no same-stage dependency, marked queued
    pub fn seed(&mut self) -> Vec<Uuid> {
        let ready: Vec<Uuid> = self
            .order
            .iter()
            .copied()
            .filter(|id| !self.queued.contains(id))
            .filter(|id| self.dependencies.get(id).is_some_and(|deps| deps.is_empty()))
            .collect();
        self.queued.extend(ready.iter().copied());
        ready
    }

    /// Records a dependency-satisfying completion and returns the jobs it unblocked
    ///
    /// Every returned job is marked queued, so it is never returned again.
    pub fn on_job_completed(&mut self, id: Uuid) -> Result<Vec<Uuid>, SchedulingError> {
        if !self.knows(id) {
            return Err(SchedulingError::UnknownJob(id));
        }

        if self.queued.insert(id) {
            tracing::debug!("Job {} completed before it was marked queued", id);
        }
        if !self.completed.insert(id) {
            return Ok(Vec::new());
        }

        let mut ready = Vec::new();
        for candidate in &self.order {
            if self.queued.contains(candidate) {
                continue;
            }
            let Some(deps) = self.dependencies.get(candidate) else {
                continue;
            };
            if deps.contains(&id) && deps.iter().all(|d| self.completed.contains(d)) {
                ready.push(*candidate);
            }
        }
        self.queued.extend(ready.iter().copied());

        Ok(ready)
    }

    pub fn is_queued(&self, id: Uuid) -> bool {
        self.queued.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::domain::definition::JobDefinition;
    use proptest::prelude::*;

    fn job(name: &str, deps: &[&str]) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            image: "alpine".to_string(),
            script: vec!["true".to_string()],
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            allow_failure: false,
        }
    }

    fn stage_with(jobs: Vec<JobDefinition>) -> (StageDefinition, Vec<JobExecution>) {
        let stage_id = Uuid::new_v4();
        let executions = jobs
            .iter()
            .map(|j| JobExecution::new(stage_id, &j.name, j.allow_failure))
            .collect();
        (
            StageDefinition {
                name: "test".to_string(),
                jobs,
            },
            executions,
        )
    }

    fn id_of(jobs: &[JobExecution], name: &str) -> Uuid {
        jobs.iter().find(|j| j.job_name == name).unwrap().id
    }

    #[test]
    fn test_seed_returns_independent_jobs_once() {
        let (stage, jobs) = stage_with(vec![job("a", &[]), job("b", &["a"]), job("c", &[])]);
        let mut set = ReadySet::from_stage(&stage, &jobs).unwrap();

        assert_eq!(set.seed(), vec![id_of(&jobs, "a"), id_of(&jobs, "c")]);
        assert!(set.seed().is_empty());
    }

    #[test]
    fn test_dependent_waits_for_all_dependencies() {
        let (stage, jobs) = stage_with(vec![job("a", &[]), job("b", &[]), job("c", &["a", "b"])]);
        let mut set = ReadySet::from_stage(&stage, &jobs).unwrap();
        set.seed();

        assert!(set.on_job_completed(id_of(&jobs, "a")).unwrap().is_empty());
        assert_eq!(
            set.on_job_completed(id_of(&jobs, "b")).unwrap(),
            vec![id_of(&jobs, "c")]
        );
    }

    #[test]
    fn test_duplicate_completion_releases_nothing() {
        let (stage, jobs) = stage_with(vec![job("a", &[]), job("b", &["a"])]);
        let mut set = ReadySet::from_stage(&stage, &jobs).unwrap();
        set.seed();

        assert_eq!(set.on_job_completed(id_of(&jobs, "a")).unwrap().len(), 1);
        assert!(set.on_job_completed(id_of(&jobs, "a")).unwrap().is_empty());
    }

    #[test]
    fn test_earlier_stage_dependencies_are_dropped() {
        let (stage, jobs) = stage_with(vec![job("unit", &["compile"])]);
        let mut set = ReadySet::from_stage(&stage, &jobs).unwrap();

        assert_eq!(set.seed(), vec![id_of(&jobs, "unit")]);
    }

    #[test]
    fn test_unknown_job_is_an_error() {
        let (stage, jobs) = stage_with(vec![job("a", &[])]);
        let mut set = ReadySet::from_stage(&stage, &jobs).unwrap();
        let stranger = Uuid::new_v4();

        assert_eq!(
            set.on_job_completed(stranger),
            Err(SchedulingError::UnknownJob(stranger))
        );
    }

    #[test]
    fn test_missing_execution_record() {
        let (stage, mut jobs) = stage_with(vec![job("a", &[]), job("b", &[])]);
        jobs.pop();

        assert_eq!(
            ReadySet::from_stage(&stage, &jobs).unwrap_err(),
            SchedulingError::MissingExecution("b".to_string())
        );
    }

    #[test]
    fn test_completion_before_queue_marking_is_recorded() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut set = ReadySet::new(vec![(a, vec![]), (b, vec![a])]);

        assert_eq!(set.on_job_completed(a).unwrap(), vec![b]);
        assert!(set.is_queued(a));
        assert!(set.seed().is_empty());
    }

    /// A random DAG: job `i` may only depend on jobs with a lower index
    fn dag() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
        (1usize..12).prop_flat_map(|n| {
            let deps = (0..n)
                .map(|i| proptest::sample::subsequence((0..i).collect::<Vec<_>>(), 0..=i))
                .collect::<Vec<_>>();
            (deps, proptest::collection::vec(any::<usize>(), n))
        })
    }

    proptest! {
        #[test]
        fn prop_each_job_ready_once_and_only_after_its_dependencies((deps, picks) in dag()) {
            let ids: Vec<Uuid> = (0..deps.len()).map(|_| Uuid::new_v4()).collect();
            let mut set = ReadySet::new(
                deps.iter()
                    .enumerate()
                    .map(|(i, d)| (ids[i], d.iter().map(|&j| ids[j]).collect())),
            );
            let index: HashMap<Uuid, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

            let mut released = HashSet::new();
            let mut completed = HashSet::new();
            let mut pool = set.seed();
            for id in &pool {
                prop_assert!(deps[index[id]].is_empty());
                prop_assert!(released.insert(*id));
            }

            let mut step = 0;
            while !pool.is_empty() {
                let pick = picks[step % picks.len()] % pool.len();
                step += 1;
                let done = pool.swap_remove(pick);
                completed.insert(index[&done]);

                for id in set.on_job_completed(done).unwrap() {
                    prop_assert!(released.insert(id), "job released twice");
                    prop_assert!(deps[index[&id]].iter().all(|d| completed.contains(d)));
                    pool.push(id);
                }
            }

            prop_assert_eq!(released.len(), ids.len());
        }
    }
}
