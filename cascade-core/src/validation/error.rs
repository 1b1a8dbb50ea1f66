//! Validation error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position in the pipeline source file, attached by the parser layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// Malformed definition (missing field, empty list, duplicate name)
    Structural,
    /// Dependency names a job that does not exist
    MissingDependency,
    /// Dependency names a job that only exists in a later stage
    ForwardDependency,
    /// Dependency graph contains a cycle
    Cycle,
}

/// A single validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{}", render(.location, .path, .message))]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    /// Offending path, e.g. `pipeline.stages[0].jobs[1].image`
    pub path: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Cycle path for `Cycle` errors, canonical rotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<Vec<String>>,
}

fn render(location: &Option<SourceLocation>, path: &str, message: &str) -> String {
    match location {
        Some(loc) => format!("{}:{}:{}: {}", loc.file, loc.line, loc.column, message),
        None => format!("{}: {}", path, message),
    }
}

impl ValidationError {
    pub fn structural(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ValidationErrorKind::Structural,
            path: path.into(),
            message: message.into(),
            location: None,
            cycle: None,
        }
    }

    pub fn missing_dependency(path: impl Into<String>, job: &str, dependency: &str) -> Self {
        Self {
            kind: ValidationErrorKind::MissingDependency,
            path: path.into(),
            message: format!("job '{}' depends on non-existent job '{}'", job, dependency),
            location: None,
            cycle: None,
        }
    }

    pub fn forward_dependency(
        path: impl Into<String>,
        job: &str,
        dependency: &str,
        dependency_stage: &str,
    ) -> Self {
        Self {
            kind: ValidationErrorKind::ForwardDependency,
            path: path.into(),
            message: format!(
                "job '{}' depends on '{}' from later stage '{}'",
                job, dependency, dependency_stage
            ),
            location: None,
            cycle: None,
        }
    }

    pub fn cycle(path: impl Into<String>, cycle: Vec<String>) -> Self {
        let mut rendered = cycle.join(" -> ");
        if let Some(first) = cycle.first() {
            rendered.push_str(" -> ");
            rendered.push_str(first);
        }
        Self {
            kind: ValidationErrorKind::Cycle,
            path: path.into(),
            message: format!("circular dependency detected: {}", rendered),
            location: None,
            cycle: Some(cycle),
        }
    }

    /// Attaches a source position
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn is_dependency_error(&self) -> bool {
        !matches!(self.kind, ValidationErrorKind::Structural)
    }
}

/// Every problem found while validating one pipeline definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{}", render_all(.errors))]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

fn render_all(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl ValidationReport {
    pub fn new(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Cycle paths contained in the report
    pub fn cycles(&self) -> impl Iterator<Item = &[String]> {
        self.errors.iter().filter_map(|e| e.cycle.as_deref())
    }

    /// Lets the parser layer attach source positions by path
    pub fn locate<F>(mut self, mut locator: F) -> Self
    where
        F: FnMut(&str) -> Option<SourceLocation>,
    {
        for error in &mut self.errors {
            if error.location.is_none() {
                error.location = locator(&error.path);
            }
        }
        self
    }

    pub(crate) fn into_result(self) -> Result<(), ValidationReport> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<ValidationError> for ValidationReport {
    fn from(error: ValidationError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}
