//! Classification and presentation of parsing failures

use crate::core::error::PipelineError;
use crate::llm::oracle::OracleError;
use crate::recovery::taxonomy::{ParsingErrorCategory, Severity};
use crate::task::schema::FieldViolation;
use crate::task::types::{TaskId, TaskType};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use thiserror::Error;

/// What was being parsed when the failure happened
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub command: Option<String>,
    pub player: Option<String>,
    pub task_id: Option<TaskId>,
    pub task_type: Option<TaskType>,
    pub violations: Vec<FieldViolation>,
    pub missing: Vec<String>,
}

impl ErrorContext {
    pub fn for_command(command: &str, player: Option<&str>) -> Self {
        Self {
            command: Some(command.to_string()),
            player: player.map(str::to_string),
            ..Self::default()
        }
    }

    /// Key for per-task retry counters: the task id, else the command
    pub fn retry_key(&self) -> String {
        match (&self.task_id, &self.command) {
            (Some(id), _) => id.0.to_string(),
            (None, Some(command)) => crate::core::types::normalize_command(command),
            (None, None) => "global".to_string(),
        }
    }
}

/// A classified failure, as surfaced to callers
#[derive(Error, Debug)]
#[error("[{severity}] {category}: {message}")]
pub struct ParsingError {
    pub category: ParsingErrorCategory,
    pub severity: Severity,
    pub message: String,
    pub context: ErrorContext,
    /// Name of the last recovery strategy tried, if any
    pub recovery_strategy: Option<String>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl ParsingError {
    pub fn new(category: ParsingErrorCategory, message: impl Into<String>, context: ErrorContext) -> Self {
        Self {
            category,
            severity: category.severity(),
            message: message.into(),
            context,
            recovery_strategy: None,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The typed pipeline error behind this failure, if there is one
    pub fn pipeline_error(&self) -> Option<&PipelineError> {
        self.source.as_ref()?.downcast_ref::<PipelineError>()
    }

    /// Whether the oracle was categorically unreachable
    pub fn is_unavailable(&self) -> bool {
        matches!(self.pipeline_error(), Some(PipelineError::Oracle(e)) if e.is_unavailable())
    }

    /// Oracle failures a retry cannot fix: unreachable service or a rejected request
    pub fn is_permanent(&self) -> bool {
        matches!(self.pipeline_error(), Some(PipelineError::Oracle(e)) if !e.is_transient())
    }
}

/// Receives errors that recovery could not fix
pub trait BaseErrorHandler: Send + Sync {
    fn handle(&self, error: &ParsingError);
}

/// Logs unrecovered errors at a level matching their severity
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl BaseErrorHandler for LoggingErrorHandler {
    fn handle(&self, error: &ParsingError) {
        let command = error.context.command.as_deref().unwrap_or("");
        match error.severity {
            Severity::Critical | Severity::High => tracing::error!(
                category = %error.category,
                severity = %error.severity,
                command,
                "{}",
                error.message
            ),
            Severity::Medium | Severity::Low => tracing::warn!(
                category = %error.category,
                severity = %error.severity,
                command,
                "{}",
                error.message
            ),
        }
    }
}

/// Maps raw failures onto the taxonomy and renders them for users
#[derive(Debug, Clone, Copy, Default)]
pub struct ParsingErrorHandler;

impl ParsingErrorHandler {
    pub fn new() -> Self {
        Self
    }

    /// Typed variants decide first; untyped messages fall back to keyword heuristics
    pub fn categorize_parsing_error(&self, error: &PipelineError) -> ParsingErrorCategory {
        match error {
            PipelineError::Oracle(_) => ParsingErrorCategory::ServiceError,
            PipelineError::ResponseFormat(_) | PipelineError::Json(_) => {
                ParsingErrorCategory::ResponseParsing
            }
            PipelineError::Schema(_) => ParsingErrorCategory::SchemaValidation,
            PipelineError::MissingParameters { .. } => ParsingErrorCategory::MissingParameters,
            PipelineError::UnsupportedAction(_) => ParsingErrorCategory::UnsupportedAction,
            PipelineError::ContextMismatch(_) => ParsingErrorCategory::ContextMismatch,
            PipelineError::Ambiguous(_) => ParsingErrorCategory::AmbiguousIntent,
            PipelineError::InvalidCommand(_) => ParsingErrorCategory::InvalidCommand,
            PipelineError::Message(message) => self.categorize_message(message),
        }
    }

    /// Best-effort classification of an untyped message
    pub fn categorize_message(&self, message: &str) -> ParsingErrorCategory {
        const RULES: &[(&[&str], ParsingErrorCategory)] = &[
            (
                &["timeout", "timed out", "unavailable", "connection", "network", "rate limit", "503", "api error"],
                ParsingErrorCategory::ServiceError,
            ),
            (
                &["json", "parse", "unexpected token", "syntax"],
                ParsingErrorCategory::ResponseParsing,
            ),
            (&["schema", "validation"], ParsingErrorCategory::SchemaValidation),
            (&["missing", "required"], ParsingErrorCategory::MissingParameters),
            (
                &["unsupported", "not supported", "unknown action"],
                ParsingErrorCategory::UnsupportedAction,
            ),
            (
                &["context", "not reachable", "unreachable", "no tool", "inventory"],
                ParsingErrorCategory::ContextMismatch,
            ),
            (&["ambiguous", "unclear"], ParsingErrorCategory::AmbiguousIntent),
        ];

        let lower = message.to_lowercase();
        RULES
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
            .map(|(_, category)| *category)
            .unwrap_or(ParsingErrorCategory::InvalidCommand)
    }

    pub fn determine_parsing_severity(&self, category: ParsingErrorCategory) -> Severity {
        category.severity()
    }

    /// Classify a pipeline error once, keeping it as the source
    pub fn handle(&self, error: PipelineError, mut context: ErrorContext) -> ParsingError {
        let category = self.categorize_parsing_error(&error);
        match &error {
            PipelineError::Schema(violations) => context.violations = violations.clone(),
            PipelineError::MissingParameters { task_type, missing } => {
                context.task_type = Some(*task_type);
                context.missing = missing.clone();
            }
            _ => {}
        }
        ParsingError::new(category, error.to_string(), context).with_source(error)
    }

    /// Short message for chat
    pub fn user_friendly_message(&self, error: &ParsingError) -> String {
        let template = error.category.template();
        let mut msg = template.title.to_string();
        if let Some(command) = &error.context.command {
            msg.push_str(&format!(" (\"{}\")", command));
        }
        msg.push_str(": ");
        msg.push_str(template.description);
        if !error.context.missing.is_empty() {
            msg.push_str(&format!(" Missing: {}.", error.context.missing.join(", ")));
        }
        if let Some(first) = template.suggestions.first() {
            msg.push_str(&format!(" Try: {}.", first));
        }
        msg
    }

    /// Multi-line explanation with every suggestion and validation detail
    pub fn detailed_explanation(&self, error: &ParsingError) -> String {
        let template = error.category.template();
        let mut out = format!(
            "{} [{} / {}]\n{}\n",
            template.title, error.category, error.severity, template.description
        );

        if let Some(command) = &error.context.command {
            out.push_str(&format!("Command: {}\n", command));
        }
        if let Some(task_type) = error.context.task_type {
            out.push_str(&format!("Task type: {}\n", task_type));
        }
        if let Some(task_id) = &error.context.task_id {
            out.push_str(&format!("Task id: {}\n", task_id.0));
        }
        if !error.context.missing.is_empty() {
            out.push_str(&format!("Missing: {}\n", error.context.missing.join(", ")));
        }
        if !error.context.violations.is_empty() {
            out.push_str("Validation errors:\n");
            for v in &error.context.violations {
                out.push_str(&format!("  - {}\n", v));
            }
        }
        out.push_str(&format!("Cause: {}\n", error.message));
        if let Some(strategy) = &error.recovery_strategy {
            out.push_str(&format!("Last recovery attempt: {}\n", strategy));
        }

        out.push_str("Suggestions:\n");
        for (i, s) in template.suggestions.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, s));
        }
        out
    }
}

/// Shortcut for oracle failures observed outside a `PipelineError`
impl From<OracleError> for ParsingError {
    fn from(error: OracleError) -> Self {
        ParsingErrorHandler.handle(PipelineError::Oracle(error), ErrorContext::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> ParsingErrorHandler {
        ParsingErrorHandler::new()
    }

    #[test]
    fn test_typed_errors_win_over_message_text() {
        // The message mentions JSON but the variant says service error
        let e = PipelineError::Oracle(OracleError::Transport("bad json in proxy".into()));
        assert_eq!(handler().categorize_parsing_error(&e), ParsingErrorCategory::ServiceError);
        let e = PipelineError::InvalidCommand("missing verb".into());
        assert_eq!(handler().categorize_parsing_error(&e), ParsingErrorCategory::InvalidCommand);
    }

    #[test]
    fn test_message_heuristics() {
        let h = handler();
        let cases = [
            ("request timed out", ParsingErrorCategory::ServiceError),
            ("Unexpected token < in JSON", ParsingErrorCategory::ResponseParsing),
            ("could not parse reply", ParsingErrorCategory::ResponseParsing),
            ("schema check failed", ParsingErrorCategory::SchemaValidation),
            ("field x is required", ParsingErrorCategory::MissingParameters),
            ("unknown action: dance", ParsingErrorCategory::UnsupportedAction),
            ("target not reachable", ParsingErrorCategory::ContextMismatch),
            ("the request is unclear", ParsingErrorCategory::AmbiguousIntent),
            ("blah", ParsingErrorCategory::InvalidCommand),
        ];
        for (msg, expected) in cases {
            assert_eq!(h.categorize_message(msg), expected, "{}", msg);
        }
    }

    #[test]
    fn test_handle_keeps_source_and_details() {
        let e = PipelineError::MissingParameters {
            task_type: TaskType::Navigation,
            missing: vec!["destination".into()],
        };
        let err = handler().handle(e, ErrorContext::for_command("go", Some("alex")));
        assert_eq!(err.category, ParsingErrorCategory::MissingParameters);
        assert_eq!(err.severity, Severity::Low);
        assert_eq!(err.context.missing, vec!["destination".to_string()]);
        assert!(err.source().is_some());
        assert!(matches!(
            err.pipeline_error(),
            Some(PipelineError::MissingParameters { .. })
        ));
    }

    #[test]
    fn test_unavailable_is_critical() {
        let err: ParsingError = OracleError::Unavailable("connection refused".into()).into();
        assert_eq!(err.category, ParsingErrorCategory::ServiceError);
        assert_eq!(err.severity, Severity::Critical);
        assert!(err.is_unavailable());
        assert!(err.to_string().starts_with("[CRITICAL] service_error"));
    }

    #[test]
    fn test_rejected_request_is_permanent() {
        let rejected: ParsingError = OracleError::Http {
            status: 401,
            body: "invalid api key".into(),
        }
        .into();
        assert!(rejected.is_permanent());
        assert!(!rejected.is_unavailable());

        let throttled: ParsingError = OracleError::RateLimited.into();
        assert!(!throttled.is_permanent());
        let overloaded: ParsingError = OracleError::Http {
            status: 503,
            body: String::new(),
        }
        .into();
        assert!(!overloaded.is_permanent());
    }

    #[test]
    fn test_source_chain_reaches_oracle_error() {
        let err: ParsingError = OracleError::Timeout("slow".into()).into();
        let source = err.source().unwrap();
        assert!(source.to_string().contains("slow"));
    }

    #[test]
    fn test_messages_render_templates() {
        let e = PipelineError::Schema(vec![FieldViolation::new("parameters.count", "must be a positive integer")]);
        let err = handler().handle(e, ErrorContext::for_command("mine -3 iron", None));
        let friendly = handler().user_friendly_message(&err);
        assert!(friendly.starts_with("Task failed validation"));
        assert!(friendly.contains("mine -3 iron"));

        let detail = handler().detailed_explanation(&err);
        assert!(detail.contains("parameters.count: must be a positive integer"));
        assert!(detail.contains("HIGH"));
        assert!(detail.contains("  1. "));
    }

    #[test]
    fn test_retry_key_prefers_task_id() {
        let mut ctx = ErrorContext::for_command("Mine  Iron", None);
        assert_eq!(ctx.retry_key(), "mine iron");
        let id = TaskId::new();
        ctx.task_id = Some(id);
        assert_eq!(ctx.retry_key(), id.0.to_string());
        assert_eq!(ErrorContext::default().retry_key(), "global");
    }
}
