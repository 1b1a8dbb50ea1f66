//! Pipeline definition validation
//!
//! Structural checks run first and fail fast; dependency checks need a
//! well-formed definition and collect every problem they find. Nothing here
//! creates execution state, so a rejected definition never produces a run.

pub mod dependency;
pub mod error;
pub mod structural;

pub use dependency::{canonicalize_cycle, detect_cycles, validate_dependencies};
pub use error::{SourceLocation, ValidationError, ValidationErrorKind, ValidationReport};
pub use structural::validate_structure;

use crate::domain::definition::PipelineDefinition;

/// Runs structural then dependency validation
pub fn validate_pipeline(pipeline: &PipelineDefinition) -> Result<(), ValidationReport> {
    validate_structure(pipeline).map_err(ValidationReport::from)?;
    validate_dependencies(pipeline)
}
