//! Pipeline DTOs for API communication

use serde::{Deserialize, Serialize};

use crate::domain::definition::PipelineDefinition;

/// Parameters of a triggered run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub is_local: bool,
    /// Host directory mounted as the job workspace
    ///
    /// When unset, each job gets a fresh directory under the runner's workspace base.
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// Request to validate, preview or run a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPipeline {
    pub pipeline: PipelineDefinition,
    #[serde(flatten)]
    pub run: RunRequest,
}
