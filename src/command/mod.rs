//! Command handling front to back
//!
//! `TaskParser` drives a command through the pipeline; the cache and the
//! confirmation handler hold the state it shares between calls.

pub mod cache;
pub mod confirmation;
pub mod parser;

pub use cache::{CacheEntry, CacheStats, CommandCache};
pub use confirmation::{
    ConfirmationDecision, ConfirmationOption, ConfirmationPrompt, OptionSource, UserConfirmationHandler,
};
pub use parser::{corroborate, ParseOutcome, ParserStats, TaskParser, TaskParserBuilder};
