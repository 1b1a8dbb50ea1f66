//! Execution domain types
//!
//! Records of one run of a pipeline. The status state machine is shared by
//! pipeline, stage and job executions:
//!
//! ```text
//! PENDING -> RUNNING -> { SUCCESS, FAILED, CANCELED }
//! PENDING -> { FAILED, CANCELED }
//! ```
//!
//! Terminal states are final. The completion timestamp is written exactly once,
//! by the transition that enters the terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::log::{LogEntry, render_entries};

/// Execution status shared by pipelines, stages and jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }

    /// Whether a job that ended in this status unblocks its dependents
    ///
    /// A tolerated failure satisfies dependencies the same way a success does.
    pub fn satisfies_dependency(self, allow_failure: bool) -> bool {
        match self {
            Self::Success => true,
            Self::Failed | Self::Canceled => allow_failure,
            Self::Pending | Self::Running => false,
        }
    }

    pub fn can_transition_to(self, to: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, to),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Canceled)
                | (Running, Success)
                | (Running, Failed)
                | (Running, Canceled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("already terminal ({from}), cannot move to {to}")]
    AlreadyTerminal {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("invalid transition from {from} to {to}")]
    Invalid {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },
}

impl TransitionError {
    /// Late or duplicate reports for finished work hit this case
    pub fn is_already_terminal(&self) -> bool {
        matches!(self, Self::AlreadyTerminal { .. })
    }
}

fn apply_transition(
    status: &mut ExecutionStatus,
    started_at: &mut Option<DateTime<Utc>>,
    completed_at: &mut Option<DateTime<Utc>>,
    to: ExecutionStatus,
    now: DateTime<Utc>,
) -> Result<(), TransitionError> {
    let from = *status;
    if from.is_terminal() {
        return Err(TransitionError::AlreadyTerminal { from, to });
    }
    if !from.can_transition_to(to) {
        return Err(TransitionError::Invalid { from, to });
    }

    if to == ExecutionStatus::Running {
        started_at.get_or_insert(now);
    }
    if to.is_terminal() {
        *completed_at = Some(now);
    }
    *status = to;
    Ok(())
}

/// One run of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub id: Uuid,
    pub pipeline_name: String,
    /// Monotonically increasing per pipeline name, starting at 1
    pub run_number: i32,
    pub commit_hash: Option<String>,
    pub is_local: bool,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineExecution {
    pub fn new(
        pipeline_name: impl Into<String>,
        run_number: i32,
        commit_hash: Option<String>,
        is_local: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_name: pipeline_name.into(),
            run_number,
            commit_hash,
            is_local,
            status: ExecutionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn transition(&mut self, to: ExecutionStatus) -> Result<(), TransitionError> {
        apply_transition(
            &mut self.status,
            &mut self.started_at,
            &mut self.completed_at,
            to,
            Utc::now(),
        )
    }
}

/// One stage of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageExecution {
    pub id: Uuid,
    pub pipeline_execution_id: Uuid,
    pub stage_name: String,
    pub execution_order: i32,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageExecution {
    pub fn new(pipeline_execution_id: Uuid, stage_name: impl Into<String>, execution_order: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_execution_id,
            stage_name: stage_name.into(),
            execution_order,
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn transition(&mut self, to: ExecutionStatus) -> Result<(), TransitionError> {
        apply_transition(
            &mut self.status,
            &mut self.started_at,
            &mut self.completed_at,
            to,
            Utc::now(),
        )
    }
}

/// One job of one stage run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub stage_execution_id: Uuid,
    pub job_name: String,
    pub status: ExecutionStatus,
    /// Copied from the definition when the stage begins
    pub allow_failure: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Accumulated log text
    pub logs: String,
}

impl JobExecution {
    pub fn new(stage_execution_id: Uuid, job_name: impl Into<String>, allow_failure: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage_execution_id,
            job_name: job_name.into(),
            status: ExecutionStatus::Pending,
            allow_failure,
            started_at: None,
            completed_at: None,
            logs: String::new(),
        }
    }

    pub fn transition(&mut self, to: ExecutionStatus) -> Result<(), TransitionError> {
        apply_transition(
            &mut self.status,
            &mut self.started_at,
            &mut self.completed_at,
            to,
            Utc::now(),
        )
    }

    /// Cancels the job unless it already finished
    ///
    /// Returns true when the job moved to CANCELED.
    pub fn cancel(&mut self) -> bool {
        self.transition(ExecutionStatus::Canceled).is_ok()
    }

    pub fn satisfies_dependency(&self) -> bool {
        self.status.satisfies_dependency(self.allow_failure)
    }

    /// Terminal, not successful, and not covered by allow-failure
    pub fn is_blocking_failure(&self) -> bool {
        matches!(self.status, ExecutionStatus::Failed | ExecutionStatus::Canceled) && !self.allow_failure
    }

    pub fn append_logs<'a>(&mut self, entries: impl IntoIterator<Item = &'a LogEntry>) {
        self.logs.push_str(&render_entries(entries));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::log::LogLevel;

    #[test]
    fn test_status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::Canceled).unwrap();
        assert_eq!(json, "\"CANCELED\"");
        let parsed: ExecutionStatus = serde_json::from_str("\"RUNNING\"").unwrap();
        assert_eq!(parsed, ExecutionStatus::Running);
    }

    #[test]
    fn test_status_parse_round_trips_as_str() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Success,
            ExecutionStatus::Failed,
            ExecutionStatus::Canceled,
        ] {
            assert_eq!(ExecutionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ExecutionStatus::parse("DONE"), None);
    }

    #[test]
    fn test_running_sets_start_and_terminal_sets_completion() {
        let mut job = JobExecution::new(Uuid::new_v4(), "compile", false);
        assert!(job.started_at.is_none());

        job.transition(ExecutionStatus::Running).unwrap();
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());

        job.transition(ExecutionStatus::Success).unwrap();
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut stage = StageExecution::new(Uuid::new_v4(), "build", 0);
        stage.transition(ExecutionStatus::Running).unwrap();
        stage.transition(ExecutionStatus::Failed).unwrap();
        let completed = stage.completed_at;

        let err = stage.transition(ExecutionStatus::Success).unwrap_err();
        assert!(err.is_already_terminal());
        assert_eq!(stage.status, ExecutionStatus::Failed);
        assert_eq!(stage.completed_at, completed);
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let mut pipeline = PipelineExecution::new("demo", 1, None, true);
        let err = pipeline.transition(ExecutionStatus::Success).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Invalid {
                from: ExecutionStatus::Pending,
                to: ExecutionStatus::Success
            }
        );

        pipeline.transition(ExecutionStatus::Running).unwrap();
        assert!(pipeline.transition(ExecutionStatus::Pending).is_err());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut job = JobExecution::new(Uuid::new_v4(), "unit", false);
        assert!(job.cancel());
        assert!(!job.cancel());
        assert_eq!(job.status, ExecutionStatus::Canceled);

        let mut done = JobExecution::new(Uuid::new_v4(), "lint", false);
        done.transition(ExecutionStatus::Running).unwrap();
        done.transition(ExecutionStatus::Success).unwrap();
        assert!(!done.cancel());
        assert_eq!(done.status, ExecutionStatus::Success);
    }

    #[test]
    fn test_dependency_satisfaction_honors_allow_failure() {
        assert!(ExecutionStatus::Success.satisfies_dependency(false));
        assert!(!ExecutionStatus::Failed.satisfies_dependency(false));
        assert!(ExecutionStatus::Failed.satisfies_dependency(true));
        assert!(ExecutionStatus::Canceled.satisfies_dependency(true));
        assert!(!ExecutionStatus::Running.satisfies_dependency(true));
    }

    #[test]
    fn test_append_logs_renders_each_entry_on_its_own_line() {
        let mut job = JobExecution::new(Uuid::new_v4(), "unit", false);
        let entries = vec![
            LogEntry::new(LogLevel::Info, "starting"),
            LogEntry::new(LogLevel::Error, "boom"),
        ];
        job.append_logs(&entries);

        let lines: Vec<_> = job.logs.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("INFO starting"));
        assert!(lines[1].ends_with("ERROR boom"));
    }
}
