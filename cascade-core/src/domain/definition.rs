//! Pipeline definition types
//!
//! The in-memory form of a pipeline file once the parser layer has read it.
//! Definitions are immutable after parsing; validation and ordering only borrow them.

use serde::{Deserialize, Serialize};

/// Maximum length of a pipeline name
pub const MAX_PIPELINE_NAME_LEN: usize = 255;

/// Pipeline definition
///
/// Stages execute in declaration order; a stage's position is its execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

/// Stage definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

/// Job definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    /// Container image the script runs in
    pub image: String,
    /// Script lines, run in order
    #[serde(default)]
    pub script: Vec<String>,
    /// Names of jobs that must finish before this one starts
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Whether a failure of this job is tolerated by its stage
    #[serde(default)]
    pub allow_failure: bool,
}

/// Position of a job inside a pipeline definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobRef {
    pub stage: usize,
    pub job: usize,
}

impl PipelineDefinition {
    /// Stage names paired with their execution order index
    pub fn stage_order(&self) -> impl Iterator<Item = (usize, &str)> {
        self.stages
            .iter()
            .enumerate()
            .map(|(idx, stage)| (idx, stage.name.as_str()))
    }

    /// Finds a stage by name
    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Total number of jobs across all stages
    pub fn job_count(&self) -> usize {
        self.stages.iter().map(|stage| stage.jobs.len()).sum()
    }

    /// Iterates over every job together with its position
    pub fn jobs(&self) -> impl Iterator<Item = (JobRef, &JobDefinition)> {
        self.stages.iter().enumerate().flat_map(|(stage_idx, stage)| {
            stage.jobs.iter().enumerate().map(move |(job_idx, job)| {
                (
                    JobRef {
                        stage: stage_idx,
                        job: job_idx,
                    },
                    job,
                )
            })
        })
    }

    /// Returns the job at the given position
    pub fn job(&self, at: JobRef) -> Option<&JobDefinition> {
        self.stages.get(at.stage).and_then(|stage| stage.jobs.get(at.job))
    }

    /// Resolves a dependency name declared by a job in `from_stage`
    ///
    /// A job in the same stage wins; otherwise the nearest earlier stage declaring
    /// the name. Later stages are reported separately so validation can tell a
    /// forward reference apart from a missing one.
    pub fn resolve_dependency(&self, from_stage: usize, name: &str) -> Resolution {
        if let Some(job) = self.position_in_stage(from_stage, name) {
            return Resolution::SameStage(JobRef {
                stage: from_stage,
                job,
            });
        }

        for stage in (0..from_stage).rev() {
            if let Some(job) = self.position_in_stage(stage, name) {
                return Resolution::EarlierStage(JobRef { stage, job });
            }
        }

        for stage in from_stage + 1..self.stages.len() {
            if let Some(job) = self.position_in_stage(stage, name) {
                return Resolution::LaterStage(JobRef { stage, job });
            }
        }

        Resolution::Missing
    }

    fn position_in_stage(&self, stage: usize, name: &str) -> Option<usize> {
        self.stages
            .get(stage)
            .and_then(|s| s.jobs.iter().position(|job| job.name == name))
    }
}

/// Outcome of resolving a dependency name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    SameStage(JobRef),
    EarlierStage(JobRef),
    LaterStage(JobRef),
    Missing,
}

impl JobDefinition {
    /// True when the script has at least one non-blank line
    pub fn has_script(&self) -> bool {
        self.script.iter().any(|line| !line.trim().is_empty())
    }
}
