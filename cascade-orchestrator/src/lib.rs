//! Cascade Orchestrator
//!
//! Runs validated pipelines: stores execution state, schedules jobs stage by
//! stage as their dependencies complete, hands ready jobs to the worker pool,
//! and serves status and reports over HTTP.
//!
//! Architecture:
//! - Configuration: bind address, database and queue sizing from the environment
//! - Repository: the execution store (in-memory or PostgreSQL)
//! - Services: scheduling, stage completion, validation and reports
//! - Engine: pipeline tasks and stage actors
//! - API: the HTTP surface

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod repository;
pub mod service;

pub use config::Config;
pub use engine::{Orchestrator, OrchestratorError, RunHandle};
