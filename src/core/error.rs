use crate::llm::oracle::OracleError;
use crate::task::schema::FieldViolation;
use crate::task::types::TaskType;
use thiserror::Error;

/// A failure observed somewhere in the pipeline, before classification
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Malformed oracle response: {0}")]
    ResponseFormat(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema validation failed: {}", join_violations(.0))]
    Schema(Vec<FieldViolation>),

    #[error("Missing parameters for {task_type}: {}", .missing.join(", "))]
    MissingParameters {
        task_type: TaskType,
        missing: Vec<String>,
    },

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Context mismatch: {0}")]
    ContextMismatch(String),

    #[error("Ambiguous intent: {0}")]
    Ambiguous(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Untyped failure from a collaborator; classified by message heuristics
    #[error("{0}")]
    Message(String),
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, PipelineError>;
