//! Execution backends
//!
//! An execution backend runs one job's script to completion inside a container
//! and reports how it went. A non-zero exit is an ordinary FAILED outcome; an
//! `Err` means the script could not be run at all.

mod podman;

use anyhow::Result;
use async_trait::async_trait;
use cascade_core::domain::execution::ExecutionStatus;
use cascade_core::domain::log::LogEntry;

pub use podman::{PodmanBackend, check_runtime_available};

/// Result of running a script to completion
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub logs: Vec<LogEntry>,
}

impl ExecutionOutcome {
    pub fn success(logs: Vec<LogEntry>) -> Self {
        Self {
            status: ExecutionStatus::Success,
            exit_code: Some(0),
            logs,
        }
    }

    pub fn failed(exit_code: Option<i32>, logs: Vec<LogEntry>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            exit_code,
            logs,
        }
    }
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Runs `script` in `image` with `working_dir` mounted as the workspace
    async fn execute(
        &self,
        image: &str,
        script: &[String],
        working_dir: &str,
    ) -> Result<ExecutionOutcome>;
}
