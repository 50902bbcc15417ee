//! Closed taxonomy of parsing failures
//!
//! Every failure the pipeline surfaces falls into exactly one category. The
//! category fixes the severity, the retry policy and the message template.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingErrorCategory {
    /// The oracle could not be reached or failed to answer
    ServiceError,
    InvalidCommand,
    AmbiguousIntent,
    MissingParameters,
    UnsupportedAction,
    /// The command does not fit the agent's current situation
    ContextMismatch,
    /// The oracle answered with something that is not a task
    ResponseParsing,
    SchemaValidation,
}

impl ParsingErrorCategory {
    pub const ALL: [ParsingErrorCategory; 8] = [
        Self::ServiceError,
        Self::InvalidCommand,
        Self::AmbiguousIntent,
        Self::MissingParameters,
        Self::UnsupportedAction,
        Self::ContextMismatch,
        Self::ResponseParsing,
        Self::SchemaValidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceError => "service_error",
            Self::InvalidCommand => "invalid_command",
            Self::AmbiguousIntent => "ambiguous_intent",
            Self::MissingParameters => "missing_parameters",
            Self::UnsupportedAction => "unsupported_action",
            Self::ContextMismatch => "context_mismatch",
            Self::ResponseParsing => "response_parsing",
            Self::SchemaValidation => "schema_validation",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::ServiceError => Severity::Critical,
            Self::ResponseParsing | Self::SchemaValidation | Self::ContextMismatch => Severity::High,
            Self::InvalidCommand | Self::AmbiguousIntent => Severity::Medium,
            Self::MissingParameters | Self::UnsupportedAction => Severity::Low,
        }
    }

    pub fn template(&self) -> ErrorTemplate {
        match self {
            Self::ServiceError => ErrorTemplate {
                title: "Command service unavailable",
                description: "The command interpreter could not be reached, so the command was not understood.",
                suggestions: &[
                    "Wait a moment and send the command again",
                    "Check that the language model endpoint and API key are configured",
                ],
            },
            Self::InvalidCommand => ErrorTemplate {
                title: "Command not understood",
                description: "The command does not describe something the agent can do.",
                suggestions: &[
                    "Start with an action such as go, mine, build or craft",
                    "Name the target explicitly, for example \"mine 10 iron ore\"",
                ],
            },
            Self::AmbiguousIntent => ErrorTemplate {
                title: "Command is ambiguous",
                description: "The command could mean more than one kind of task.",
                suggestions: &[
                    "Pick one of the offered interpretations",
                    "Rephrase with a more specific verb",
                ],
            },
            Self::MissingParameters => ErrorTemplate {
                title: "Missing details",
                description: "The task type was recognized but required details are missing.",
                suggestions: &[
                    "Add the missing details to the command",
                    "Give coordinates as three numbers, for example \"go to 100 64 -200\"",
                ],
            },
            Self::UnsupportedAction => ErrorTemplate {
                title: "Action not supported",
                description: "The agent does not know how to perform this action.",
                suggestions: &[
                    "Ask for status to see what the agent can do",
                    "Break the request into simpler tasks",
                ],
            },
            Self::ContextMismatch => ErrorTemplate {
                title: "Not possible right now",
                description: "The command does not fit the agent's current surroundings or inventory.",
                suggestions: &[
                    "Make sure the agent has the required tools or materials",
                    "Move the agent closer to the target first",
                ],
            },
            Self::ResponseParsing => ErrorTemplate {
                title: "Interpreter returned an unreadable answer",
                description: "The command interpreter answered, but not with a usable task.",
                suggestions: &[
                    "Send the command again",
                    "Use shorter, simpler wording",
                ],
            },
            Self::SchemaValidation => ErrorTemplate {
                title: "Task failed validation",
                description: "The interpreted task has fields with invalid values.",
                suggestions: &[
                    "Check numbers such as counts and coordinates",
                    "Send the command again with explicit values",
                ],
            },
        }
    }
}

impl fmt::Display for ParsingErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        })
    }
}

/// User-facing text for a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorTemplate {
    pub title: &'static str,
    pub description: &'static str,
    /// Remediation steps, most useful first
    pub suggestions: &'static [&'static str],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        use ParsingErrorCategory::*;
        assert_eq!(ServiceError.severity(), Severity::Critical);
        for c in [ResponseParsing, SchemaValidation, ContextMismatch] {
            assert_eq!(c.severity(), Severity::High);
        }
        for c in [InvalidCommand, AmbiguousIntent] {
            assert_eq!(c.severity(), Severity::Medium);
        }
        for c in [MissingParameters, UnsupportedAction] {
            assert_eq!(c.severity(), Severity::Low);
        }
    }

    #[test]
    fn test_every_category_has_suggestions() {
        for c in ParsingErrorCategory::ALL {
            let t = c.template();
            assert!(!t.title.is_empty());
            assert!(!t.suggestions.is_empty(), "{} has no suggestions", c);
        }
    }

    #[test]
    fn test_severity_ordering_and_wire_names() {
        assert!(Severity::Critical > Severity::High);
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"CRITICAL\"");
        assert_eq!(
            serde_json::to_string(&ParsingErrorCategory::ServiceError).unwrap(),
            "\"service_error\""
        );
    }
}
