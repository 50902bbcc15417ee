//! Error taxonomy, classification and recovery

pub mod handler;
pub mod manager;
pub mod taxonomy;

pub use handler::{BaseErrorHandler, ErrorContext, LoggingErrorHandler, ParsingError, ParsingErrorHandler};
pub use manager::{Backoff, ErrorRecoveryManager, RecoveryAction, RecoveryStrategy, RetryPolicy, RetryRequest};
pub use taxonomy::{ErrorTemplate, ParsingErrorCategory, Severity};
