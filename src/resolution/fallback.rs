//! Confidence scoring and fallback-chain traversal for task types

use crate::core::config::ResolutionConfig;
use crate::core::types::clamp_unit;
use crate::resolution::hierarchy::TypeHierarchy;
use crate::task::context::TaskContext;
use crate::task::types::{TaskParameters, TaskType};
use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Success rate assumed for a type with no reported executions
pub const DEFAULT_TYPE_SUCCESS: f64 = 0.5;
const TYPE_SUCCESS_SMOOTHING: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackAlternative {
    pub task_type: TaskType,
    pub confidence: f64,
    pub reason: String,
    pub priority: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeFallbackResult {
    pub final_type: TaskType,
    pub confidence: f64,
    /// Applicable alternatives, most confident first
    pub alternatives: Vec<FallbackAlternative>,
    pub warnings: Vec<String>,
    /// Types visited by the fallback chain, starting with the base type
    pub resolution_path: Vec<TaskType>,
}

pub struct TypeFallbackSystem {
    hierarchy: Arc<TypeHierarchy>,
    type_success: RwLock<AHashMap<TaskType, f64>>,
    config: ResolutionConfig,
}

impl TypeFallbackSystem {
    pub fn new(hierarchy: Arc<TypeHierarchy>, config: ResolutionConfig) -> Self {
        Self {
            hierarchy,
            type_success: RwLock::new(AHashMap::new()),
            config,
        }
    }

    pub fn hierarchy(&self) -> &Arc<TypeHierarchy> {
        &self.hierarchy
    }

    /// `base + sum(weight of factors that hold) + historical_weight * success_rate`
    ///
    /// Unregistered types score their historical term only.
    pub fn calculate_confidence(&self, task_type: TaskType, context: &TaskContext) -> f64 {
        let rate = self.type_success_rate(task_type);
        let Some(def) = self.hierarchy.get(task_type) else {
            return clamp_unit(0.2 * rate);
        };

        let context_sum: f64 = def
            .context_weights
            .iter()
            .filter(|w| w.factor.holds(context))
            .map(|w| w.weight)
            .sum();

        clamp_unit(def.base_score + context_sum + def.historical_weight * rate)
    }

    /// Fallback candidates of `task_type` whose conditions all hold, most confident first
    pub fn generate_alternatives(
        &self,
        task_type: TaskType,
        context: &TaskContext,
        params: &TaskParameters,
    ) -> Vec<FallbackAlternative> {
        let Some(def) = self.hierarchy.get(task_type) else {
            return Vec::new();
        };

        let mut alternatives: Vec<FallbackAlternative> = def
            .fallback_chain
            .iter()
            .filter(|rule| rule.candidate != task_type && rule.applies(context, params))
            .map(|rule| FallbackAlternative {
                task_type: rule.candidate,
                confidence: self.calculate_confidence(rule.candidate, context),
                reason: rule.reason.clone(),
                priority: rule.priority,
            })
            .collect();

        alternatives.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.priority.cmp(&b.priority))
        });
        alternatives
    }

    /// Walk the chain from `start`, taking the lowest-priority applicable rule at each step
    ///
    /// Types already on the path are never revisited, so cyclic chains terminate.
    pub fn follow_resolution_chain(
        &self,
        start: TaskType,
        context: &TaskContext,
        params: &TaskParameters,
    ) -> Vec<TaskType> {
        let mut path = vec![start];
        let mut visited: AHashSet<TaskType> = AHashSet::new();
        visited.insert(start);
        let mut current = start;

        while let Some(def) = self.hierarchy.get(current) {
            let next = def
                .fallback_chain
                .iter()
                .filter(|rule| !visited.contains(&rule.candidate) && rule.applies(context, params))
                .min_by_key(|rule| rule.priority)
                .map(|rule| rule.candidate);

            match next {
                Some(t) => {
                    visited.insert(t);
                    path.push(t);
                    current = t;
                }
                None => break,
            }
        }

        path
    }

    /// Keep the base type unless it is weak and a strictly better alternative applies
    pub fn determine_final_type(
        &self,
        task_type: TaskType,
        context: &TaskContext,
        params: &TaskParameters,
    ) -> TypeFallbackResult {
        let base_confidence = self.calculate_confidence(task_type, context);
        let alternatives = self.generate_alternatives(task_type, context, params);
        let resolution_path = self.follow_resolution_chain(task_type, context, params);
        let mut warnings = Vec::new();

        let (final_type, confidence) = if base_confidence >= self.config.keep_threshold {
            (task_type, base_confidence)
        } else {
            warnings.push(format!(
                "{} confidence {:.2} is below {:.2}",
                task_type, base_confidence, self.config.keep_threshold
            ));
            match alternatives.first() {
                Some(best) if best.confidence > base_confidence => {
                    warnings.push(format!(
                        "falling back from {} to {}: {}",
                        task_type, best.task_type, best.reason
                    ));
                    (best.task_type, best.confidence)
                }
                _ => (task_type, base_confidence),
            }
        };

        if final_type != task_type {
            tracing::warn!(from = %task_type, to = %final_type, confidence, "type fallback applied");
        }

        TypeFallbackResult {
            final_type,
            confidence,
            alternatives,
            warnings,
            resolution_path,
        }
    }

    /// Fold a reported execution outcome into the type's success rate
    pub fn record_outcome(&self, task_type: TaskType, success: bool) {
        let mut rates = self.type_success.write();
        let rate = rates.entry(task_type).or_insert(DEFAULT_TYPE_SUCCESS);
        *rate = clamp_unit(
            *rate * TYPE_SUCCESS_SMOOTHING
                + if success { 1.0 - TYPE_SUCCESS_SMOOTHING } else { 0.0 },
        );
    }

    pub fn type_success_rate(&self, task_type: TaskType) -> f64 {
        self.type_success
            .read()
            .get(&task_type)
            .copied()
            .unwrap_or(DEFAULT_TYPE_SUCCESS)
    }
}
