//! Context-driven disambiguation
//!
//! When the detector cannot separate two readings, this component re-scores
//! each candidate type with finer signals than the detector's factor checks,
//! consults recent confirmed history and folds in how pressing the agent's
//! situation is:
//!
//! `combined = 0.4 * ambiguity + 0.3 * context + 0.2 * historical + 0.1 * current_state`

use crate::ambiguity::detector::AmbiguityResult;
use crate::core::types::{clamp_unit, Clock, Timestamp};
use crate::disambiguation::history::{HistoricalPattern, HistoricalPatternStore, RelevantPattern};
use crate::task::context::{TaskContext, MAX_VITAL};
use crate::task::types::TaskType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const AMBIGUITY_WEIGHT: f64 = 0.4;
pub const CONTEXT_WEIGHT: f64 = 0.3;
pub const HISTORICAL_WEIGHT: f64 = 0.2;
pub const CURRENT_STATE_WEIGHT: f64 = 0.1;

/// Historical score for a type with no matching history
pub const NEUTRAL_HISTORICAL_SCORE: f64 = 0.5;

/// Below this fraction of the maximum, health or food counts as low
const LOW_VITAL_FRACTION: f32 = 0.3;
const FULL_INVENTORY: f64 = 0.9;
/// Recent tasks (from the latest) that earn a recency bonus
const RECENCY_WINDOW: usize = 3;
const RECENCY_BONUS: f64 = 0.1;

/// Per-type score breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub task_type: TaskType,
    pub ambiguity_score: f64,
    pub context_score: f64,
    pub historical_score: f64,
    pub combined: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisambiguationResult {
    pub resolved_type: TaskType,
    pub confidence: f64,
    pub context_factors: BTreeMap<String, f64>,
    /// Commands of the historical patterns that informed the decision
    pub historical_matches: Vec<String>,
    pub current_state_relevance: f64,
    /// Every candidate considered, best first
    pub candidates: Vec<CandidateScore>,
}

pub struct ContextDisambiguator {
    history: Arc<HistoricalPatternStore>,
    clock: Arc<dyn Clock>,
}

impl ContextDisambiguator {
    pub fn new(history: Arc<HistoricalPatternStore>, clock: Arc<dyn Clock>) -> Self {
        Self { history, clock }
    }

    pub fn history(&self) -> &Arc<HistoricalPatternStore> {
        &self.history
    }

    /// Pick one type from the detector's candidates
    ///
    /// Returns `None` when no pattern fired; the caller supplies a catch-all.
    pub fn disambiguate(
        &self,
        command: &str,
        context: &TaskContext,
        ambiguity: &AmbiguityResult,
    ) -> Option<DisambiguationResult> {
        let top = ambiguity.top()?;
        let current_state_relevance = current_state_relevance(context);

        if !ambiguity.is_ambiguous {
            return Some(DisambiguationResult {
                resolved_type: top.task_type,
                confidence: top.total_score,
                context_factors: ambiguity.context_factors.clone(),
                historical_matches: Vec::new(),
                current_state_relevance,
                candidates: vec![CandidateScore {
                    task_type: top.task_type,
                    ambiguity_score: top.total_score,
                    context_score: top.context_relevance,
                    historical_score: top.historical_success,
                    combined: top.total_score,
                }],
            });
        }

        let matches = self.history.matching(command, self.clock.now());

        let mut candidates: Vec<CandidateScore> = ambiguity
            .best_per_type()
            .into_iter()
            .map(|(task_type, ambiguity_score)| {
                let context_score = context_score(task_type, context);
                let historical_score = historical_score(task_type, &matches);
                let combined = clamp_unit(
                    AMBIGUITY_WEIGHT * ambiguity_score
                        + CONTEXT_WEIGHT * context_score
                        + HISTORICAL_WEIGHT * historical_score
                        + CURRENT_STATE_WEIGHT * current_state_relevance,
                );
                CandidateScore {
                    task_type,
                    ambiguity_score,
                    context_score,
                    historical_score,
                    combined,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.combined
                .partial_cmp(&a.combined)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best = candidates.first()?.clone();

        let mut context_factors = ambiguity.context_factors.clone();
        for c in &candidates {
            context_factors.insert(format!("context_score:{}", c.task_type), c.context_score);
        }

        let mut historical_matches: Vec<String> = Vec::new();
        for m in &matches {
            if !historical_matches.contains(&m.pattern.command) {
                historical_matches.push(m.pattern.command.clone());
            }
        }

        tracing::debug!(
            command,
            resolved = %best.task_type,
            confidence = best.combined,
            candidates = candidates.len(),
            history = matches.len(),
            "disambiguated command"
        );

        Some(DisambiguationResult {
            resolved_type: best.task_type,
            confidence: best.combined,
            context_factors,
            historical_matches,
            current_state_relevance,
            candidates,
        })
    }

    /// Record a confirmed outcome; the only write path into the history store
    pub fn add_historical_pattern(
        &self,
        command: &str,
        resolved_type: TaskType,
        success: bool,
        context_factors: BTreeMap<String, f64>,
    ) {
        self.add_historical_pattern_at(command, resolved_type, success, context_factors, self.clock.now());
    }

    fn add_historical_pattern_at(
        &self,
        command: &str,
        resolved_type: TaskType,
        success: bool,
        context_factors: BTreeMap<String, f64>,
        timestamp: Timestamp,
    ) {
        self.history.add(HistoricalPattern {
            command: command.to_string(),
            resolved_type,
            success,
            timestamp,
            context_factors,
        });
        tracing::debug!(command, %resolved_type, success, "historical pattern recorded");
    }

    /// Relevant history for a command, with relevance and similarity
    pub fn matching_history(&self, command: &str) -> Vec<RelevantPattern> {
        self.history.matching(command, self.clock.now())
    }
}

/// Fine-grained context fit for a candidate type, in [0, 1]
pub fn context_score(task_type: TaskType, ctx: &TaskContext) -> f64 {
    let flag = |b: bool| if b { 1.0 } else { 0.0 };

    let base = match task_type {
        TaskType::Mining => {
            0.4 * flag(ctx.has_tool("pickaxe"))
                + 0.4 * ctx.block_proximity("ore")
                + 0.2 * flag(ctx.has_space())
        }
        TaskType::Navigation => {
            0.5 * flag(ctx.pathfinding.path_clear)
                + 0.3 * flag(ctx.pathfinding.destination_reachable)
                + 0.2 * flag(!ctx.hostile_nearby())
        }
        TaskType::Exploration => {
            0.3 * flag(!ctx.is_night())
                + 0.3 * flag(ctx.vitals.health > MAX_VITAL / 2.0)
                + 0.2 * flag(ctx.has_space())
                + 0.2 * flag(ctx.has_tool("compass") || ctx.has_materials("map", 1))
        }
        TaskType::Farming => {
            0.3 * flag(ctx.has_tool("hoe"))
                + 0.4 * ctx.block_proximity("farmland").max(ctx.block_proximity("wheat"))
                + 0.3 * flag(ctx.has_materials("seeds", 1))
        }
        TaskType::Building => {
            let blocks = ctx.inventory.count_of("planks")
                + ctx.inventory.count_of("cobblestone")
                + ctx.inventory.count_of("stone")
                + ctx.inventory.count_of("dirt");
            0.6 * (blocks as f64 / 64.0).min(1.0)
                + 0.2 * flag(ctx.pathfinding.path_clear)
                + 0.2 * flag(!ctx.is_night())
        }
        TaskType::Crafting => {
            0.5 * ctx.block_proximity("crafting_table").max(ctx.block_proximity("furnace"))
                + 0.5
                    * flag(
                        ctx.has_materials("planks", 1)
                            || ctx.has_materials("ingot", 1)
                            || ctx.has_materials("stick", 1),
                    )
        }
        TaskType::Gathering => {
            0.3 * flag(ctx.has_tool("axe"))
                + 0.5 * ctx.block_proximity("log")
                + 0.2 * flag(ctx.has_space())
        }
        TaskType::Combat => {
            0.4 * flag(ctx.has_tool("sword")) + 0.6 * flag(ctx.hostile_nearby())
        }
        TaskType::Inventory => {
            0.6 * ctx.block_proximity("chest") + 0.4 * ctx.inventory.fullness()
        }
        TaskType::Query => 0.5,
    };

    let recency = ctx
        .recent_tasks
        .iter()
        .rev()
        .take(RECENCY_WINDOW)
        .any(|t| t.task_type == task_type && t.success);

    clamp_unit(base + if recency { RECENCY_BONUS } else { 0.0 })
}

/// Relevance-weighted success rate of matching history for a type
pub fn historical_score(task_type: TaskType, matches: &[RelevantPattern]) -> f64 {
    let (weighted_success, total_weight) = matches
        .iter()
        .filter(|m| m.pattern.resolved_type == task_type)
        .fold((0.0, 0.0), |(s, w), m| {
            let weight = m.relevance * m.similarity.max(f64::EPSILON);
            (s + if m.pattern.success { weight } else { 0.0 }, w + weight)
        });

    if total_weight <= 0.0 {
        NEUTRAL_HISTORICAL_SCORE
    } else {
        clamp_unit(weighted_success / total_weight)
    }
}

/// How pressing the agent's situation is, from additive danger signals
pub fn current_state_relevance(ctx: &TaskContext) -> f64 {
    let mut relevance = 0.0;
    if ctx.vitals.health < MAX_VITAL * LOW_VITAL_FRACTION {
        relevance += 0.4;
    }
    if ctx.vitals.food < MAX_VITAL * LOW_VITAL_FRACTION {
        relevance += 0.3;
    }
    if ctx.inventory.fullness() >= FULL_INVENTORY {
        relevance += 0.2;
    }
    if ctx.is_night() {
        relevance += 0.2;
    }
    clamp_unit(relevance)
}
