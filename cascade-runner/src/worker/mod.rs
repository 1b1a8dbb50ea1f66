//! Worker
//!
//! Consumes job dispatch messages with bounded concurrency.

mod pool;

pub use pool::{Admission, WorkerPool};
