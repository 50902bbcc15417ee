//! Bounded store of past command resolutions
//!
//! Patterns are appended on confirmed outcomes only and lose relevance
//! exponentially with age (`decay_rate ^ age_hours`). The store never holds
//! more than `max_patterns` entries; the oldest by timestamp goes first.

use crate::core::config::HistoryConfig;
use crate::core::types::{token_similarity, Timestamp, MILLIS_PER_HOUR};
use crate::task::types::TaskType;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A recorded command-to-type outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPattern {
    pub command: String,
    pub resolved_type: TaskType,
    pub success: bool,
    pub timestamp: Timestamp,
    /// Context factor relevances at the time of the outcome
    pub context_factors: BTreeMap<String, f64>,
}

/// A stored pattern with its relevance to a query
#[derive(Debug, Clone, PartialEq)]
pub struct RelevantPattern {
    pub pattern: HistoricalPattern,
    /// Time-decayed relevance (0.0 - 1.0)
    pub relevance: f64,
    /// Token similarity to the queried command (0.0 - 1.0)
    pub similarity: f64,
}

pub struct HistoricalPatternStore {
    patterns: RwLock<Vec<HistoricalPattern>>,
    config: HistoryConfig,
}

impl HistoricalPatternStore {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            patterns: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Append a pattern, evicting the oldest entries beyond the cap
    pub fn add(&self, pattern: HistoricalPattern) {
        let mut patterns = self.patterns.write();
        patterns.push(pattern);
        while patterns.len() > self.config.max_patterns {
            let oldest = patterns
                .iter()
                .enumerate()
                .min_by_key(|(_, p)| p.timestamp)
                .map(|(i, _)| i);
            match oldest {
                Some(i) => {
                    let evicted = patterns.remove(i);
                    tracing::trace!(command = %evicted.command, "historical pattern evicted");
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<HistoricalPattern> {
        self.patterns.read().clone()
    }

    /// Decayed relevance of a pattern at `now`
    pub fn relevance(&self, pattern: &HistoricalPattern, now: Timestamp) -> f64 {
        let age_hours = now.saturating_sub(pattern.timestamp) as f64 / MILLIS_PER_HOUR as f64;
        self.config.decay_rate.powf(age_hours).clamp(0.0, 1.0)
    }

    /// Patterns above the relevance floor, most recent first
    pub fn relevant(&self, now: Timestamp) -> Vec<RelevantPattern> {
        let mut relevant: Vec<RelevantPattern> = self
            .patterns
            .read()
            .iter()
            .filter_map(|p| {
                let relevance = self.relevance(p, now);
                (relevance >= self.config.relevance_floor).then(|| RelevantPattern {
                    pattern: p.clone(),
                    relevance,
                    similarity: 0.0,
                })
            })
            .collect();
        relevant.sort_by(|a, b| b.pattern.timestamp.cmp(&a.pattern.timestamp));
        relevant
    }

    /// The `recent_limit` most recent relevant patterns similar to `command`
    pub fn matching(&self, command: &str, now: Timestamp) -> Vec<RelevantPattern> {
        self.relevant(now)
            .into_iter()
            .filter_map(|mut r| {
                r.similarity = token_similarity(command, &r.pattern.command);
                (r.similarity >= self.config.similarity_threshold).then_some(r)
            })
            .take(self.config.recent_limit)
            .collect()
    }
}

impl Default for HistoricalPatternStore {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}
