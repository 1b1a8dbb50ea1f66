//! Service layer
//!
//! Helpers used by the worker while a job runs.

mod log_buffer;

pub use log_buffer::{InMemoryLogBuffer, LogBufferService};
