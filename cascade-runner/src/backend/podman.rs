//! Podman execution backend
//!
//! Runs each job in a fresh container:
//! - The working directory is mounted at /workspace
//! - The entrypoint is overridden with /bin/sh so images with custom
//!   entrypoints behave the same
//! - Script lines are joined with `&&`, so the first failing line stops the job
//!
//! Works with any docker-compatible CLI through `CONTAINER_RUNTIME`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use cascade_core::domain::log::LogEntry;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ExecutionBackend, ExecutionOutcome};
use crate::config::Config;

/// Checks if the container runtime is installed and available
pub fn check_runtime_available(runtime: &str) -> Result<()> {
    let output = std::process::Command::new(runtime)
        .arg("--version")
        .output()
        .with_context(|| format!("Failed to execute '{} --version'. Is it installed?", runtime))?;

    if !output.status.success() {
        anyhow::bail!("{} is not working correctly", runtime);
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Container runtime is available: {}", version.trim());

    Ok(())
}

pub struct PodmanBackend {
    runtime: String,
}

impl PodmanBackend {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.container_runtime.clone())
    }

    fn build_command(&self, image: &str, script: &[String], working_dir: &Path) -> Command {
        let mut command = Command::new(&self.runtime);
        command
            .arg("run")
            .arg("--rm")
            .arg("-v")
            .arg(format!("{}:/workspace", working_dir.display()))
            .arg("-w")
            .arg("/workspace")
            .arg("--entrypoint")
            .arg("/bin/sh")
            .arg(image)
            .arg("-c")
            .arg(join_script(script))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ExecutionBackend for PodmanBackend {
    async fn execute(
        &self,
        image: &str,
        script: &[String],
        working_dir: &str,
    ) -> Result<ExecutionOutcome> {
        let working_dir = std::path::absolute(working_dir)
            .with_context(|| format!("Invalid working directory '{}'", working_dir))?;

        tokio::fs::create_dir_all(&working_dir)
            .await
            .context("Failed to create workspace directory")?;

        debug!(
            "Running {} script line(s) in {} (workspace {})",
            script.len(),
            image,
            working_dir.display()
        );

        let output = self
            .build_command(image, script, &working_dir)
            .output()
            .await
            .with_context(|| format!("Failed to execute {} run command", self.runtime))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut logs: Vec<LogEntry> = stdout.lines().map(LogEntry::info).collect();
        logs.extend(stderr.lines().map(LogEntry::error));

        let exit_code = output.status.code();
        debug!(
            "Container for {} exited: exit_code={:?}, stdout_len={}, stderr_len={}",
            image,
            exit_code,
            stdout.len(),
            stderr.len()
        );

        if output.status.success() {
            Ok(ExecutionOutcome::success(logs))
        } else {
            logs.push(LogEntry::error(match exit_code {
                Some(code) => format!("Script exited with code {}", code),
                None => "Script terminated by signal".to_string(),
            }));
            Ok(ExecutionOutcome::failed(exit_code, logs))
        }
    }
}

fn join_script(script: &[String]) -> String {
    script
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" && ")
}
