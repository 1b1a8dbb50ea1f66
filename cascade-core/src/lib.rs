//! Cascade Core
//!
//! Core types and algorithms for the Cascade CI/CD orchestrator.
//!
//! This crate contains:
//! - Domain types: pipeline definitions and execution records (Pipeline, Stage, Job)
//! - Validation: structural and dependency checks run before any execution exists
//! - Ordering: the dependency-respecting stage/job order used by dry runs
//! - DTOs: data transfer objects for orchestrator/runner communication and reports

pub mod domain;
pub mod dto;
pub mod order;
pub mod validation;

pub use order::{ExecutionOrder, OrderError, generate_execution_order};
pub use validation::{ValidationError, ValidationErrorKind, ValidationReport, validate_pipeline};
