//! Text-generation oracle: interface, HTTP client, prompts and response parsing

pub mod client;
pub mod oracle;
pub mod prompt;
pub mod response;

pub use client::LlmClient;
pub use oracle::{OracleError, OraclePrompt, TextOracle};
pub use prompt::PromptBuilder;
pub use response::{parse_response, ParsedResponse};
