//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services sit between the engine or API and the execution store.

pub mod coordinator;
pub mod pipeline;
pub mod report;
pub mod scheduler;

// Re-export for convenience
pub use coordinator as coordinator_service;
pub use pipeline as pipeline_service;
pub use report as report_service;
pub use scheduler::{ReadySet, SchedulingError};
