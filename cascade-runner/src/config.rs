//! Runner configuration
//!
//! Defines the configurable parameters of the worker pool: concurrency,
//! execution timeout, workspace location and container runtime.

use std::time::Duration;

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Max jobs executing at the same time
    pub max_parallel_jobs: usize,

    /// Maximum time a job can run before it is failed; `None` waits forever
    pub job_timeout: Option<Duration>,

    /// Directory under which per-job workspaces are created
    pub workspace_base: String,

    /// Container runtime binary (podman or docker)
    pub container_runtime: String,

    /// Report a tolerated failure as SUCCESS instead of FAILED
    pub report_tolerated_failure_as_success: bool,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            max_parallel_jobs: 5,
            job_timeout: None,
            workspace_base: "/tmp/cascade".to_string(),
            container_runtime: "podman".to_string(),
            report_tolerated_failure_as_success: false,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - MAX_PARALLEL_JOBS (optional, default: 5)
    /// - JOB_TIMEOUT (optional, seconds, default: none)
    /// - WORKSPACE_BASE (optional, default: /tmp/cascade)
    /// - CONTAINER_RUNTIME (optional, default: podman)
    /// - REPORT_TOLERATED_FAILURE_AS_SUCCESS (optional, default: false)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new();

        let max_parallel_jobs = match std::env::var("MAX_PARALLEL_JOBS") {
            Ok(raw) => raw
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("MAX_PARALLEL_JOBS must be a number, got '{}'", raw))?,
            Err(_) => defaults.max_parallel_jobs,
        };

        let job_timeout = std::env::var("JOB_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        let workspace_base =
            std::env::var("WORKSPACE_BASE").unwrap_or(defaults.workspace_base);

        let container_runtime =
            std::env::var("CONTAINER_RUNTIME").unwrap_or(defaults.container_runtime);

        let report_tolerated_failure_as_success = std::env::var("REPORT_TOLERATED_FAILURE_AS_SUCCESS")
            .ok()
            .map(|s| parse_flag(&s))
            .unwrap_or(defaults.report_tolerated_failure_as_success);

        Ok(Self {
            max_parallel_jobs,
            job_timeout,
            workspace_base,
            container_runtime,
            report_tolerated_failure_as_success,
        })
    }

    pub fn with_max_parallel_jobs(mut self, max_parallel_jobs: usize) -> Self {
        self.max_parallel_jobs = max_parallel_jobs;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        if self.job_timeout.is_some_and(|timeout| timeout.is_zero()) {
            anyhow::bail!("job_timeout must be greater than 0");
        }

        if self.workspace_base.is_empty() {
            anyhow::bail!("workspace_base cannot be empty");
        }

        if self.container_runtime.is_empty() {
            anyhow::bail!("container_runtime cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
