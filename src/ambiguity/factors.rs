//! Context factors: typed predicates over a `TaskContext`
//!
//! Each factor evaluates to a relevance in [0, 1]. Most are boolean; block and
//! entity proximity are graded by distance.

use crate::task::context::{TaskContext, MAX_VITAL, NEAR_RADIUS};
use crate::task::types::TaskType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A named aspect of the world a pattern or fallback rule depends on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ContextFactor {
    /// Inventory holds a tool whose name contains the value
    HasTool(String),
    /// Inventory holds at least one item whose name contains the value
    HasMaterial(String),
    HasInventorySpace,
    /// A block whose name contains the value is nearby (graded by distance)
    NearBlock(String),
    /// An entity whose name contains the value is nearby (graded by distance)
    NearEntity(String),
    HostileNearby,
    PathClear,
    DestinationReachable,
    Daytime,
    Night,
    /// Health above half
    Healthy,
    /// The agent recently worked on this type of task
    RecentTask(TaskType),
    /// A plugin published a truthy value under this key
    Plugin(String),
}

impl ContextFactor {
    /// Relevance of this factor for the given snapshot, in [0, 1]
    pub fn evaluate(&self, ctx: &TaskContext) -> f64 {
        match self {
            Self::HasTool(tool) => bool_score(ctx.has_tool(tool)),
            Self::HasMaterial(material) => bool_score(ctx.has_materials(material, 1)),
            Self::HasInventorySpace => bool_score(ctx.has_space()),
            Self::NearBlock(block) => ctx.block_proximity(block),
            Self::NearEntity(entity) => ctx
                .nearest_entity(entity)
                .map(|d| (1.0 - d as f64 / NEAR_RADIUS as f64).clamp(0.0, 1.0))
                .unwrap_or(0.0),
            Self::HostileNearby => bool_score(ctx.hostile_nearby()),
            Self::PathClear => bool_score(ctx.pathfinding.path_clear),
            Self::DestinationReachable => bool_score(ctx.pathfinding.destination_reachable),
            Self::Daytime => bool_score(!ctx.is_night()),
            Self::Night => bool_score(ctx.is_night()),
            Self::Healthy => bool_score(ctx.vitals.health > MAX_VITAL / 2.0),
            Self::RecentTask(task_type) => bool_score(ctx.recency_of(*task_type).is_some()),
            Self::Plugin(key) => bool_score(ctx.plugins.get(key).map(is_truthy).unwrap_or(false)),
        }
    }

    /// Whether the factor holds, for rules that need a yes/no answer
    pub fn holds(&self, ctx: &TaskContext) -> bool {
        self.evaluate(ctx) >= 0.5
    }
}

impl fmt::Display for ContextFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HasTool(v) => write!(f, "has_tool:{}", v),
            Self::HasMaterial(v) => write!(f, "has_material:{}", v),
            Self::HasInventorySpace => f.write_str("has_inventory_space"),
            Self::NearBlock(v) => write!(f, "near_block:{}", v),
            Self::NearEntity(v) => write!(f, "near_entity:{}", v),
            Self::HostileNearby => f.write_str("hostile_nearby"),
            Self::PathClear => f.write_str("path_clear"),
            Self::DestinationReachable => f.write_str("destination_reachable"),
            Self::Daytime => f.write_str("daytime"),
            Self::Night => f.write_str("night"),
            Self::Healthy => f.write_str("healthy"),
            Self::RecentTask(t) => write!(f, "recent_task:{}", t),
            Self::Plugin(v) => write!(f, "plugin:{}", v),
        }
    }
}

/// A factor with the weight it carries in a relevance sum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedFactor {
    pub factor: ContextFactor,
    pub weight: f64,
}

impl WeightedFactor {
    pub fn new(factor: ContextFactor, weight: f64) -> Self {
        Self { factor, weight }
    }
}

/// Weighted mean of factor evaluations; 0.5 when there is nothing to weigh
pub fn weighted_relevance(factors: &[WeightedFactor], ctx: &TaskContext) -> f64 {
    let total_weight: f64 = factors.iter().map(|f| f.weight.max(0.0)).sum();
    if total_weight <= 0.0 {
        return 0.5;
    }
    let sum: f64 = factors
        .iter()
        .map(|f| f.weight.max(0.0) * f.factor.evaluate(ctx))
        .sum();
    (sum / total_weight).clamp(0.0, 1.0)
}

fn bool_score(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(false),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_factors() {
        let ctx = TaskContext::new()
            .with_item("stone_pickaxe", 1)
            .with_path(true, false);
        assert_eq!(ContextFactor::HasTool("pickaxe".into()).evaluate(&ctx), 1.0);
        assert_eq!(ContextFactor::HasTool("hoe".into()).evaluate(&ctx), 0.0);
        assert_eq!(ContextFactor::PathClear.evaluate(&ctx), 1.0);
        assert_eq!(ContextFactor::DestinationReachable.evaluate(&ctx), 0.0);
    }

    #[test]
    fn test_graded_block_factor() {
        let ctx = TaskContext::new().with_block("coal_ore", 16.0);
        let score = ContextFactor::NearBlock("ore".into()).evaluate(&ctx);
        assert!((score - 0.5).abs() < 1e-6);
        assert!(ContextFactor::NearBlock("ore".into()).holds(&ctx));
    }

    #[test]
    fn test_plugin_factor_truthiness() {
        let ctx = TaskContext::new()
            .with_plugin("raid_active", serde_json::json!(true))
            .with_plugin("empty", serde_json::json!(""));
        assert!(ContextFactor::Plugin("raid_active".into()).holds(&ctx));
        assert!(!ContextFactor::Plugin("empty".into()).holds(&ctx));
        assert!(!ContextFactor::Plugin("missing".into()).holds(&ctx));
    }

    #[test]
    fn test_weighted_relevance() {
        let ctx = TaskContext::new().with_path(true, false);
        let factors = vec![
            WeightedFactor::new(ContextFactor::PathClear, 0.75),
            WeightedFactor::new(ContextFactor::DestinationReachable, 0.25),
        ];
        assert!((weighted_relevance(&factors, &ctx) - 0.75).abs() < 1e-9);
        assert_eq!(weighted_relevance(&[], &ctx), 0.5);
    }

    #[test]
    fn test_factor_display() {
        assert_eq!(ContextFactor::NearBlock("ore".into()).to_string(), "near_block:ore");
        assert_eq!(
            ContextFactor::RecentTask(TaskType::Mining).to_string(),
            "recent_task:mining"
        );
    }
}
