//! Text-generation oracle interface
//!
//! The pipeline only needs two things from a text generator: turn a prompt
//! into text, and say quickly whether it is reachable at all.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by an oracle client
///
/// The variants are the typed markers the error handler prefers over
/// message heuristics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    /// The service cannot be reached; retrying will not help
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle request timed out: {0}")]
    Timeout(String),

    #[error("Oracle rate limited")]
    RateLimited,

    #[error("Oracle HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Oracle returned an empty response")]
    EmptyResponse,

    #[error("Oracle transport error: {0}")]
    Transport(String),
}

impl OracleError {
    /// Categorical unavailability, as opposed to a transient hiccup
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited | Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Unavailable(_) | Self::EmptyResponse => false,
        }
    }
}

/// A system/user prompt pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OraclePrompt {
    pub system: String,
    pub user: String,
}

#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Generate text (expected to contain a JSON object) for the prompt
    async fn generate(&self, prompt: &OraclePrompt) -> Result<String, OracleError>;

    /// Fail fast when the service is unreachable
    async fn check_availability(&self) -> Result<(), OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_not_transient() {
        let err = OracleError::Unavailable("connection refused".into());
        assert!(err.is_unavailable());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert!(OracleError::Http {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!OracleError::Http {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(OracleError::RateLimited.is_transient());
    }
}
