//! Job DTOs for orchestrator/worker communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::ExecutionStatus;
use crate::domain::log::LogEntry;

/// Queue message asking the worker pool to run one job
///
/// Identified by `job_execution_id`; redelivery of the same id is detected and
/// skipped by the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDispatch {
    pub job_execution_id: Uuid,
    pub stage_execution_id: Uuid,
    pub job_name: String,
    pub image: String,
    pub script: Vec<String>,
    /// Host directory mounted as the workspace; the pool picks one when unset
    pub working_dir: Option<String>,
    pub allow_failure: bool,
}

/// Terminal outcome reported by the worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompletion {
    pub job_execution_id: Uuid,
    pub stage_execution_id: Uuid,
    pub status: ExecutionStatus,
    pub logs: Vec<LogEntry>,
}
