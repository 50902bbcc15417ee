//! Command Resolver - chat commands to validated agent tasks
//!
//! Free-text commands for an autonomous game agent are interpreted by a
//! text-generation oracle, checked against pattern-based ambiguity scoring,
//! disambiguated from live context and history, confirmed with the user when
//! confidence is low, and finally validated against a task type hierarchy.

pub mod ambiguity;
pub mod command;
pub mod core;
pub mod disambiguation;
pub mod llm;
pub mod recovery;
pub mod resolution;
pub mod task;

pub use crate::command::{ParseOutcome, TaskParser};
pub use crate::core::{ParserConfig, PipelineError};
pub use crate::recovery::{ParsingError, ParsingErrorCategory, Severity};
pub use crate::task::{Task, TaskContext, TaskType};
