//! Ambiguity detection
//!
//! Scores every pattern that fires for a command on three axes and decides
//! whether the top two readings are too close to call:
//!
//! `total = 0.4 * confidence + 0.4 * context_relevance + 0.2 * historical_success`

use crate::ambiguity::factors::weighted_relevance;
use crate::ambiguity::patterns::{default_patterns, AmbiguityPattern};
use crate::core::config::AmbiguityConfig;
use crate::core::types::{clamp_unit, normalize_command};
use crate::task::context::TaskContext;
use crate::task::types::TaskType;
use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CONFIDENCE_WEIGHT: f64 = 0.4;
pub const CONTEXT_WEIGHT: f64 = 0.4;
pub const HISTORY_WEIGHT: f64 = 0.2;

/// Score of one pattern that fired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityScore {
    pub pattern_id: String,
    pub task_type: TaskType,
    pub confidence: f64,
    pub context_relevance: f64,
    pub historical_success: f64,
    pub total_score: f64,
}

impl AmbiguityScore {
    pub fn new(
        pattern_id: impl Into<String>,
        task_type: TaskType,
        confidence: f64,
        context_relevance: f64,
        historical_success: f64,
    ) -> Self {
        let confidence = clamp_unit(confidence);
        let context_relevance = clamp_unit(context_relevance);
        let historical_success = clamp_unit(historical_success);
        let total_score = clamp_unit(
            CONFIDENCE_WEIGHT * confidence
                + CONTEXT_WEIGHT * context_relevance
                + HISTORY_WEIGHT * historical_success,
        );
        Self {
            pattern_id: pattern_id.into(),
            task_type,
            confidence,
            context_relevance,
            historical_success,
            total_score,
        }
    }
}

/// Outcome of ambiguity detection for one command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityResult {
    pub is_ambiguous: bool,
    /// Ranked by total score, highest first
    pub scores: Vec<AmbiguityScore>,
    /// Distinct types whose best score exceeds the suggestion threshold
    pub suggested_types: Vec<TaskType>,
    /// Highest relevance seen per factor across the patterns that fired
    pub context_factors: BTreeMap<String, f64>,
}

impl AmbiguityResult {
    pub fn top(&self) -> Option<&AmbiguityScore> {
        self.scores.first()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Best total score per type, in ranking order
    pub fn best_per_type(&self) -> Vec<(TaskType, f64)> {
        let mut best: Vec<(TaskType, f64)> = Vec::new();
        for score in &self.scores {
            if !best.iter().any(|(t, _)| *t == score.task_type) {
                best.push((score.task_type, score.total_score));
            }
        }
        best
    }

    /// Pattern ids with the type each voted for
    pub fn pattern_votes(&self) -> Vec<(String, TaskType)> {
        self.scores
            .iter()
            .map(|s| (s.pattern_id.clone(), s.task_type))
            .collect()
    }
}

/// Detects competing readings of a command
pub struct AmbiguityDetector {
    patterns: Vec<AmbiguityPattern>,
    success_rates: RwLock<AHashMap<String, f64>>,
    config: AmbiguityConfig,
}

impl AmbiguityDetector {
    pub fn new(config: AmbiguityConfig) -> Self {
        Self::with_patterns(default_patterns(), config)
    }

    pub fn with_patterns(patterns: Vec<AmbiguityPattern>, config: AmbiguityConfig) -> Self {
        Self {
            patterns,
            success_rates: RwLock::new(AHashMap::new()),
            config,
        }
    }

    /// Add a pattern; a pattern with the same id is replaced
    pub fn register_pattern(&mut self, pattern: AmbiguityPattern) {
        self.patterns.retain(|p| p.id != pattern.id);
        self.patterns.push(pattern);
    }

    pub fn patterns(&self) -> &[AmbiguityPattern] {
        &self.patterns
    }

    /// Score every pattern that fires and decide whether the command is ambiguous
    pub fn detect_ambiguity(&self, command: &str, context: &TaskContext) -> AmbiguityResult {
        let normalized = normalize_command(command);
        let command_len = normalized.len();
        let mut result = AmbiguityResult::default();

        for pattern in &self.patterns {
            let Some(matched) = pattern.find(&normalized) else {
                continue;
            };

            let confidence = pattern.match_confidence(&matched, command_len);
            let context_relevance = weighted_relevance(&pattern.factors, context);
            let historical_success = self.historical_success(&pattern.id);

            for wf in &pattern.factors {
                let relevance = wf.factor.evaluate(context);
                let entry = result
                    .context_factors
                    .entry(wf.factor.to_string())
                    .or_insert(0.0);
                *entry = entry.max(relevance);
            }

            result.scores.push(AmbiguityScore::new(
                pattern.id.clone(),
                pattern.task_type,
                confidence,
                context_relevance,
                historical_success,
            ));
        }

        // Stable sort keeps registration order among equal scores
        result.scores.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        result.is_ambiguous = result.scores.len() >= 2
            && result.scores[0].total_score - result.scores[1].total_score < self.config.margin;

        for score in &result.scores {
            if score.total_score > self.config.suggestion_threshold
                && !result.suggested_types.contains(&score.task_type)
            {
                result.suggested_types.push(score.task_type);
            }
        }

        tracing::debug!(
            command = %normalized,
            matched = result.scores.len(),
            ambiguous = result.is_ambiguous,
            top = ?result.top().map(|s| (s.task_type, s.total_score)),
            "ambiguity detection complete"
        );

        result
    }

    /// Smoothed success rate of a pattern; the configured default when unseen
    pub fn historical_success(&self, pattern_id: &str) -> f64 {
        self.success_rates
            .read()
            .get(pattern_id)
            .copied()
            .unwrap_or(self.config.default_historical_success)
    }

    /// Fold a confirmed outcome into a pattern's success rate
    ///
    /// Only call this for outcomes a user confirmed or an executor reported.
    pub fn update_historical_success(&self, pattern_id: &str, success: bool) {
        let smoothing = self.config.smoothing;
        let mut rates = self.success_rates.write();
        let old = rates
            .get(pattern_id)
            .copied()
            .unwrap_or(self.config.default_historical_success);
        let new = clamp_unit(old * smoothing + if success { 1.0 - smoothing } else { 0.0 });
        rates.insert(pattern_id.to_string(), new);
        tracing::debug!(pattern = pattern_id, success, rate = new, "pattern success updated");
    }
}

impl Default for AmbiguityDetector {
    fn default() -> Self {
        Self::new(AmbiguityConfig::default())
    }
}
