//! Pipeline configuration with documented constants
//!
//! All tuning constants live here, grouped by the component that reads them.
//! Defaults reproduce the behaviour the scoring functions were tuned against;
//! every group can be overridden from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Ambiguity detection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbiguityConfig {
    /// Two top candidates closer than this are ambiguous
    pub margin: f64,
    /// Only candidates above this total score are suggested
    pub suggestion_threshold: f64,
    /// Weight kept from the old success rate on each confirmed outcome
    ///
    /// `new = old * smoothing + (success ? 1 - smoothing : 0)`. At 0.9 a
    /// pattern needs about seven straight successes to climb from 0.5 to 0.75.
    pub smoothing: f64,
    /// Success rate assumed for a pattern with no confirmed outcomes
    pub default_historical_success: f64,
}

impl Default for AmbiguityConfig {
    fn default() -> Self {
        Self {
            margin: 0.2,
            suggestion_threshold: 0.5,
            smoothing: 0.9,
            default_historical_success: 0.5,
        }
    }
}

/// Historical pattern store tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of stored patterns; oldest evicted first
    pub max_patterns: usize,
    /// Relevance multiplier per hour of age
    ///
    /// At 0.95 a pattern keeps half its weight after ~13.5 hours and falls
    /// under the default floor after ~45 hours.
    pub decay_rate: f64,
    /// Patterns with decayed relevance below this are ignored
    pub relevance_floor: f64,
    /// How many of the most recent relevant patterns are consulted
    pub recent_limit: usize,
    /// Minimum token similarity between commands for a pattern to match
    pub similarity_threshold: f64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_patterns: 1000,
            decay_rate: 0.95,
            relevance_floor: 0.1,
            recent_limit: 5,
            similarity_threshold: 0.5,
        }
    }
}

/// Confirmation handshake tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Resolutions at or above this confidence never ask the user
    pub acceptance_threshold: f64,
    /// How long a prompt stays answerable
    pub expiry_ms: u64,
    /// Maximum pending prompts; oldest created evicted first
    pub max_pending: usize,
    /// Multiplier applied to options suggested by history
    pub historical_discount: f64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.9,
            expiry_ms: 30_000,
            max_pending: 10,
            historical_discount: 0.8,
        }
    }
}

/// Command cache tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 300_000,
            capacity: 100,
        }
    }
}

/// Type resolution tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// A base type at or above this confidence is never replaced by a fallback
    pub keep_threshold: f64,
    /// Similarity to a recent successful task needed to adopt its type
    pub recent_override_similarity: f64,
    /// Boost weight given to an oracle that agrees with the disambiguated type
    pub corroboration_weight: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            keep_threshold: 0.7,
            recent_override_similarity: 0.8,
            corroboration_weight: 0.5,
        }
    }
}

/// Retry caps and backoff for error recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub service_max_retries: u32,
    pub response_parsing_max_retries: u32,
    pub schema_max_retries: u32,
    pub context_max_retries: u32,
    /// First backoff delay
    pub base_delay_ms: u64,
    /// Backoff never waits longer than this
    pub max_delay_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            service_max_retries: 3,
            response_parsing_max_retries: 2,
            schema_max_retries: 1,
            context_max_retries: 1,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

/// Prompt rendering limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Items, blocks, entities and recent tasks rendered per list
    pub max_context_items: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_context_items: 8,
        }
    }
}

/// Configuration for the whole command pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub ambiguity: AmbiguityConfig,
    pub history: HistoryConfig,
    pub confirmation: ConfirmationConfig,
    pub cache: CacheConfig,
    pub resolution: ResolutionConfig,
    pub recovery: RecoveryConfig,
    pub prompt: PromptConfig,
}

impl ParserConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a (possibly partial) TOML document and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ParserConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit_values = [
            ("ambiguity.margin", self.ambiguity.margin),
            ("ambiguity.suggestion_threshold", self.ambiguity.suggestion_threshold),
            ("ambiguity.smoothing", self.ambiguity.smoothing),
            (
                "ambiguity.default_historical_success",
                self.ambiguity.default_historical_success,
            ),
            ("history.relevance_floor", self.history.relevance_floor),
            ("history.similarity_threshold", self.history.similarity_threshold),
            (
                "confirmation.acceptance_threshold",
                self.confirmation.acceptance_threshold,
            ),
            (
                "confirmation.historical_discount",
                self.confirmation.historical_discount,
            ),
            ("resolution.keep_threshold", self.resolution.keep_threshold),
            (
                "resolution.recent_override_similarity",
                self.resolution.recent_override_similarity,
            ),
            (
                "resolution.corroboration_weight",
                self.resolution.corroboration_weight,
            ),
        ];
        for (name, value) in unit_values {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} ({}) must be within [0, 1]",
                    name, value
                )));
            }
        }

        if self.history.decay_rate <= 0.0 || self.history.decay_rate > 1.0 {
            return Err(ConfigError::Invalid(format!(
                "history.decay_rate ({}) must be within (0, 1]",
                self.history.decay_rate
            )));
        }

        let capacities = [
            ("history.max_patterns", self.history.max_patterns),
            ("confirmation.max_pending", self.confirmation.max_pending),
            ("cache.capacity", self.cache.capacity),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }

        if self.recovery.base_delay_ms > self.recovery.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "recovery.base_delay_ms ({}) should be <= recovery.max_delay_ms ({})",
                self.recovery.base_delay_ms, self.recovery.max_delay_ms
            )));
        }

        Ok(())
    }
}
