//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used between Cascade components
//! (orchestrator, worker pool, API consumers). DTOs are lightweight views of
//! domain entities shaped for transfer and display.

pub mod job;
pub mod pipeline;
pub mod report;
