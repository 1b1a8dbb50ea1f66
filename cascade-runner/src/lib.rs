//! Cascade Runner
//!
//! The job dispatch queue consumer: a bounded worker pool that runs ready jobs
//! through an execution backend and reports their outcome.
//!
//! Architecture:
//! - Configuration: pool size, timeout and backend settings from the environment
//! - Backend: the container runtime that runs a job's script
//! - Reporter: the boundary back to the orchestrator (start/complete a job)
//! - Services: per-job log buffering
//! - Worker: queue consumption, admission, and the per-job lifecycle

pub mod backend;
pub mod config;
pub mod reporter;
pub mod service;
pub mod worker;

pub use backend::{ExecutionBackend, ExecutionOutcome, PodmanBackend};
pub use config::Config;
pub use reporter::JobReporter;
pub use worker::{Admission, WorkerPool};
