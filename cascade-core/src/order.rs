//! Execution order generation
//!
//! Produces the stage-by-stage job order used by dry runs without executing
//! anything. Within a stage, a job is placed once every dependency has been
//! placed; jobs that cannot be placed yet wait for a later pass. Passes per stage
//! are bounded by the stage's job count, so a circular wait surfaces as an error
//! instead of looping.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::definition::{JobRef, PipelineDefinition, Resolution};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("job '{job}' in stage '{stage}' depends on '{dependency}', which cannot be resolved")]
    UnresolvedDependency {
        stage: String,
        job: String,
        dependency: String,
    },

    #[error("stage '{stage}' has jobs waiting on each other: {}", .jobs.join(", "))]
    CircularWait { stage: String, jobs: Vec<String> },
}

/// Ordered jobs for one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOrder {
    pub stage: String,
    pub jobs: Vec<String>,
}

/// Ordered mapping of stage to jobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOrder {
    pub stages: Vec<StageOrder>,
}

impl ExecutionOrder {
    pub fn stage(&self, name: &str) -> Option<&[String]> {
        self.stages
            .iter()
            .find(|s| s.stage == name)
            .map(|s| s.jobs.as_slice())
    }
}

impl fmt::Display for ExecutionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stage in &self.stages {
            writeln!(f, "{}: [{}]", stage.stage, stage.jobs.join(", "))?;
        }
        Ok(())
    }
}

pub fn generate_execution_order(pipeline: &PipelineDefinition) -> Result<ExecutionOrder, OrderError> {
    let mut completed: HashSet<JobRef> = HashSet::new();
    let mut order = ExecutionOrder::default();

    for (stage_idx, stage) in pipeline.stages.iter().enumerate() {
        let mut waiting: Vec<(JobRef, Vec<JobRef>)> = Vec::with_capacity(stage.jobs.len());
        for (job_idx, job) in stage.jobs.iter().enumerate() {
            let mut deps = Vec::with_capacity(job.dependencies.len());
            for dependency in &job.dependencies {
                match pipeline.resolve_dependency(stage_idx, dependency) {
                    Resolution::SameStage(target) | Resolution::EarlierStage(target) => {
                        deps.push(target)
                    }
                    Resolution::LaterStage(_) | Resolution::Missing => {
                        return Err(OrderError::UnresolvedDependency {
                            stage: stage.name.clone(),
                            job: job.name.clone(),
                            dependency: dependency.clone(),
                        });
                    }
                }
            }
            waiting.push((
                JobRef {
                    stage: stage_idx,
                    job: job_idx,
                },
                deps,
            ));
        }

        let mut placed = Vec::with_capacity(stage.jobs.len());
        let max_passes = stage.jobs.len();
        let mut passes = 0;

        while !waiting.is_empty() {
            if passes == max_passes {
                return Err(OrderError::CircularWait {
                    stage: stage.name.clone(),
                    jobs: waiting
                        .iter()
                        .map(|(at, _)| stage.jobs[at.job].name.clone())
                        .collect(),
                });
            }
            passes += 1;

            let mut still_waiting = Vec::with_capacity(waiting.len());
            for (at, deps) in waiting {
                if deps.iter().all(|d| completed.contains(d)) {
                    completed.insert(at);
                    placed.push(stage.jobs[at.job].name.clone());
                } else {
                    still_waiting.push((at, deps));
                }
            }
            waiting = still_waiting;
        }

        order.stages.push(StageOrder {
            stage: stage.name.clone(),
            jobs: placed,
        });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::definition::{JobDefinition, StageDefinition};

    fn job(name: &str, deps: &[&str]) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            image: "alpine".to_string(),
            script: vec!["true".to_string()],
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            allow_failure: false,
        }
    }

    fn stage(name: &str, jobs: Vec<JobDefinition>) -> StageDefinition {
        StageDefinition {
            name: name.to_string(),
            jobs,
        }
    }

    #[test]
    fn test_build_then_test_order() {
        let p = PipelineDefinition {
            name: "demo".to_string(),
            stages: vec![
                stage("build", vec![job("compile", &[])]),
                stage("test", vec![job("unit", &["compile"])]),
            ],
        };
        let order = generate_execution_order(&p).unwrap();
        assert_eq!(order.stage("build"), Some(&["compile".to_string()][..]));
        assert_eq!(order.stage("test"), Some(&["unit".to_string()][..]));
        assert_eq!(order.to_string(), "build: [compile]\ntest: [unit]\n");
    }

    #[test]
    fn test_jobs_requeued_until_dependencies_placed() {
        let p = PipelineDefinition {
            name: "demo".to_string(),
            stages: vec![stage(
                "build",
                vec![
                    job("package", &["test"]),
                    job("test", &["compile"]),
                    job("compile", &[]),
                    job("docs", &[]),
                ],
            )],
        };
        let order = generate_execution_order(&p).unwrap();
        assert_eq!(
            order.stages[0].jobs,
            vec!["compile", "docs", "test", "package"]
        );
    }

    #[test]
    fn test_placed_job_unblocks_later_job_in_same_pass() {
        let p = PipelineDefinition {
            name: "demo".to_string(),
            stages: vec![stage("build", vec![job("a", &[]), job("b", &["a"])])],
        };
        let order = generate_execution_order(&p).unwrap();
        assert_eq!(order.stages[0].jobs, vec!["a", "b"]);
    }

    #[test]
    fn test_circular_wait_terminates_with_error() {
        let p = PipelineDefinition {
            name: "demo".to_string(),
            stages: vec![stage(
                "build",
                vec![job("ok", &[]), job("x", &["y"]), job("y", &["x"])],
            )],
        };
        let err = generate_execution_order(&p).unwrap_err();
        assert_eq!(
            err,
            OrderError::CircularWait {
                stage: "build".to_string(),
                jobs: vec!["x".to_string(), "y".to_string()],
            }
        );
    }

    #[test]
    fn test_unresolved_dependency_is_error() {
        let p = PipelineDefinition {
            name: "demo".to_string(),
            stages: vec![stage("build", vec![job("a", &["ghost"])])],
        };
        assert!(matches!(
            generate_execution_order(&p),
            Err(OrderError::UnresolvedDependency { .. })
        ));
    }
}
