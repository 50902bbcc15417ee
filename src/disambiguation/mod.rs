//! Disambiguation from live context and confirmed history

pub mod disambiguator;
pub mod history;

pub use disambiguator::{CandidateScore, ContextDisambiguator, DisambiguationResult};
pub use history::{HistoricalPattern, HistoricalPatternStore, RelevantPattern};
