//! Final schema gate for resolved tasks
//!
//! The pipeline treats the validator as opaque: it either accepts a task or
//! reports field-level violations.

use crate::task::types::Task;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single field that failed validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, task: &Task) -> Result<(), Vec<FieldViolation>>;
}

/// Structural checks every task must pass
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicSchemaValidator;

impl SchemaValidator for BasicSchemaValidator {
    fn validate(&self, task: &Task) -> Result<(), Vec<FieldViolation>> {
        let mut violations = Vec::new();

        if !(0.0..=1.0).contains(&task.confidence) || task.confidence.is_nan() {
            violations.push(FieldViolation::new(
                "confidence",
                format!("must be within [0, 1], got {}", task.confidence),
            ));
        }

        if task.origin.command.trim().is_empty() {
            violations.push(FieldViolation::new("origin.command", "must not be empty"));
        }

        if let Some(coords) = task.parameters.get("coordinates") {
            for axis in ["x", "y", "z"] {
                if !coords.get(axis).map(|v| v.is_number()).unwrap_or(false) {
                    violations.push(FieldViolation::new(
                        format!("parameters.coordinates.{}", axis),
                        "must be a number",
                    ));
                }
            }
        }

        if let Some(count) = task.parameters.get("count") {
            if !count.as_u64().map(|c| c > 0).unwrap_or(false) {
                violations.push(FieldViolation::new(
                    "parameters.count",
                    "must be a positive integer",
                ));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
