//! Core domain types
//!
//! This module contains the core domain structures used across Cascade services.
//! Definitions are the immutable, parsed form of a pipeline; executions are the
//! records of one run of it, shared between orchestrator (persists) and runner
//! (updates through the orchestrator).

pub mod definition;
pub mod execution;
pub mod log;
