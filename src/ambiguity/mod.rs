//! Ambiguity detection: context factors, patterns and multi-factor scoring

pub mod detector;
pub mod factors;
pub mod patterns;

pub use detector::{AmbiguityDetector, AmbiguityResult, AmbiguityScore};
pub use factors::{ContextFactor, WeightedFactor};
pub use patterns::{default_patterns, AmbiguityPattern};
