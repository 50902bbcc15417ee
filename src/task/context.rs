//! World snapshot used to score and disambiguate commands
//!
//! A `TaskContext` is captured once per pipeline invocation and never mutated
//! by the pipeline. It carries inventory predicates, surroundings, time of day,
//! pathfinding feasibility and a bounded list of recent tasks.

use crate::core::types::Timestamp;
use crate::task::types::TaskType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of recent tasks kept in a snapshot
pub const MAX_RECENT_TASKS: usize = 10;

/// Maximum health and food values reported by the game
pub const MAX_VITAL: f32 = 20.0;

/// Ticks in a game day, and the window considered night
pub const TICKS_PER_DAY: u32 = 24_000;
pub const NIGHT_START: u32 = 13_000;
pub const NIGHT_END: u32 = 23_000;

/// Distance (blocks) beyond which nearby things stop counting as "near"
pub const NEAR_RADIUS: f32 = 32.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A block type seen near the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyBlock {
    pub name: String,
    pub distance: f32,
}

/// An entity seen near the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyEntity {
    pub name: String,
    pub hostile: bool,
    pub distance: f32,
}

/// Inventory contents and capacity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: BTreeMap<String, u32>,
    pub used_slots: u32,
    pub total_slots: u32,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            used_slots: 0,
            total_slots: 36,
        }
    }
}

impl Inventory {
    /// True if any item name contains `tool` (so "pickaxe" matches "iron_pickaxe")
    pub fn has_tool(&self, tool: &str) -> bool {
        let tool = tool.to_lowercase();
        self.items
            .iter()
            .any(|(name, count)| *count > 0 && name.to_lowercase().contains(&tool))
    }

    /// Total count across items whose name contains `material`
    pub fn count_of(&self, material: &str) -> u32 {
        let material = material.to_lowercase();
        self.items
            .iter()
            .filter(|(name, _)| name.to_lowercase().contains(&material))
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn has_materials(&self, material: &str, amount: u32) -> bool {
        self.count_of(material) >= amount.max(1)
    }

    pub fn has_space(&self) -> bool {
        self.used_slots < self.total_slots
    }

    /// Fraction of slots in use, 0.0 for an inventory with no slots
    pub fn fullness(&self) -> f64 {
        if self.total_slots == 0 {
            return 0.0;
        }
        (self.used_slots as f64 / self.total_slots as f64).clamp(0.0, 1.0)
    }
}

/// Pathfinder feasibility flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pathfinding {
    pub path_clear: bool,
    pub destination_reachable: bool,
}

/// Health and hunger, both on the game's 0-20 scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub health: f32,
    pub food: f32,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            health: MAX_VITAL,
            food: MAX_VITAL,
        }
    }
}

/// A task the agent worked on recently
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTask {
    pub task_type: TaskType,
    pub description: String,
    pub success: bool,
    pub finished_at: Timestamp,
}

/// Read-only snapshot of the agent's world
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub inventory: Inventory,
    pub position: Position,
    pub nearby_blocks: Vec<NearbyBlock>,
    pub nearby_entities: Vec<NearbyEntity>,
    /// Game time in ticks, 0..24000
    pub time_of_day: u32,
    pub pathfinding: Pathfinding,
    pub vitals: Vitals,
    /// Most recent last
    pub recent_tasks: Vec<RecentTask>,
    /// Opaque values contributed by plugins
    pub plugins: BTreeMap<String, serde_json::Value>,
}

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, name: impl Into<String>, count: u32) -> Self {
        self.inventory.items.insert(name.into(), count);
        self.inventory.used_slots = (self.inventory.used_slots + 1).min(self.inventory.total_slots);
        self
    }

    pub fn with_slots(mut self, used: u32, total: u32) -> Self {
        self.inventory.used_slots = used.min(total);
        self.inventory.total_slots = total;
        self
    }

    pub fn with_block(mut self, name: impl Into<String>, distance: f32) -> Self {
        self.nearby_blocks.push(NearbyBlock {
            name: name.into(),
            distance,
        });
        self
    }

    pub fn with_entity(mut self, name: impl Into<String>, hostile: bool, distance: f32) -> Self {
        self.nearby_entities.push(NearbyEntity {
            name: name.into(),
            hostile,
            distance,
        });
        self
    }

    pub fn with_path(mut self, path_clear: bool, destination_reachable: bool) -> Self {
        self.pathfinding = Pathfinding {
            path_clear,
            destination_reachable,
        };
        self
    }

    pub fn with_time(mut self, time_of_day: u32) -> Self {
        self.time_of_day = time_of_day % TICKS_PER_DAY;
        self
    }

    pub fn with_vitals(mut self, health: f32, food: f32) -> Self {
        self.vitals = Vitals {
            health: health.clamp(0.0, MAX_VITAL),
            food: food.clamp(0.0, MAX_VITAL),
        };
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_plugin(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.plugins.insert(key.into(), value);
        self
    }

    /// Append a recent task, keeping only the last `MAX_RECENT_TASKS`
    pub fn push_recent(&mut self, task: RecentTask) {
        self.recent_tasks.push(task);
        if self.recent_tasks.len() > MAX_RECENT_TASKS {
            let excess = self.recent_tasks.len() - MAX_RECENT_TASKS;
            self.recent_tasks.drain(..excess);
        }
    }

    pub fn with_recent(mut self, task: RecentTask) -> Self {
        self.push_recent(task);
        self
    }

    pub fn has_tool(&self, tool: &str) -> bool {
        self.inventory.has_tool(tool)
    }

    pub fn has_materials(&self, material: &str, amount: u32) -> bool {
        self.inventory.has_materials(material, amount)
    }

    pub fn has_space(&self) -> bool {
        self.inventory.has_space()
    }

    pub fn is_night(&self) -> bool {
        (NIGHT_START..NIGHT_END).contains(&self.time_of_day)
    }

    /// Distance to the closest block whose name contains `pattern`
    pub fn nearest_block(&self, pattern: &str) -> Option<f32> {
        let pattern = pattern.to_lowercase();
        self.nearby_blocks
            .iter()
            .filter(|b| b.name.to_lowercase().contains(&pattern))
            .map(|b| b.distance)
            .fold(None, |acc: Option<f32>, d| Some(acc.map_or(d, |a| a.min(d))))
    }

    /// Distance to the closest entity whose name contains `pattern`
    pub fn nearest_entity(&self, pattern: &str) -> Option<f32> {
        let pattern = pattern.to_lowercase();
        self.nearby_entities
            .iter()
            .filter(|e| e.name.to_lowercase().contains(&pattern))
            .map(|e| e.distance)
            .fold(None, |acc: Option<f32>, d| Some(acc.map_or(d, |a| a.min(d))))
    }

    pub fn hostile_nearby(&self) -> bool {
        self.nearby_entities
            .iter()
            .any(|e| e.hostile && e.distance <= NEAR_RADIUS)
    }

    /// Proximity in [0, 1]: 1 when adjacent, 0 at or beyond `NEAR_RADIUS`
    pub fn block_proximity(&self, pattern: &str) -> f64 {
        self.nearest_block(pattern)
            .map(|d| (1.0 - d as f64 / NEAR_RADIUS as f64).clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }

    /// Index from the end of the most recent task of `task_type` (0 = latest)
    pub fn recency_of(&self, task_type: TaskType) -> Option<usize> {
        self.recent_tasks
            .iter()
            .rev()
            .position(|t| t.task_type == task_type)
    }

    /// Short text summary for oracle prompts
    pub fn summary(&self, max_items: usize) -> String {
        let mut s = String::new();

        s.push_str(&format!(
            "Position: {:.0} {:.0} {:.0}\n",
            self.position.x, self.position.y, self.position.z
        ));
        s.push_str(&format!(
            "Time: {} ({})\n",
            self.time_of_day,
            if self.is_night() { "night" } else { "day" }
        ));
        s.push_str(&format!(
            "Health: {:.0}/20, Food: {:.0}/20\n",
            self.vitals.health, self.vitals.food
        ));
        s.push_str(&format!(
            "Inventory slots: {}/{}\n",
            self.inventory.used_slots, self.inventory.total_slots
        ));

        if !self.inventory.items.is_empty() {
            let items: Vec<String> = self
                .inventory
                .items
                .iter()
                .take(max_items)
                .map(|(name, count)| format!("{} x{}", name, count))
                .collect();
            s.push_str(&format!("Items: {}\n", items.join(", ")));
        }

        if !self.nearby_blocks.is_empty() {
            let blocks: Vec<&str> = self
                .nearby_blocks
                .iter()
                .take(max_items)
                .map(|b| b.name.as_str())
                .collect();
            s.push_str(&format!("Nearby blocks: {}\n", blocks.join(", ")));
        }

        if !self.nearby_entities.is_empty() {
            let entities: Vec<String> = self
                .nearby_entities
                .iter()
                .take(max_items)
                .map(|e| {
                    if e.hostile {
                        format!("{} (hostile)", e.name)
                    } else {
                        e.name.clone()
                    }
                })
                .collect();
            s.push_str(&format!("Nearby entities: {}\n", entities.join(", ")));
        }

        if !self.recent_tasks.is_empty() {
            s.push_str("Recent tasks:\n");
            for task in self.recent_tasks.iter().rev().take(max_items) {
                s.push_str(&format!(
                    "- {} ({}): {}\n",
                    task.task_type,
                    if task.success { "done" } else { "failed" },
                    task.description
                ));
            }
        }

        s
    }
}

/// Supplies a fresh snapshot for each pipeline invocation
pub trait ContextProvider: Send + Sync {
    fn snapshot(&self, player: Option<&str>) -> TaskContext;
}

/// Provider that always returns the same snapshot
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    context: TaskContext,
}

impl StaticContextProvider {
    pub fn new(context: TaskContext) -> Self {
        Self { context }
    }
}

impl ContextProvider for StaticContextProvider {
    fn snapshot(&self, _player: Option<&str>) -> TaskContext {
        self.context.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context() {
        let ctx = TaskContext::new();
        assert!(ctx.inventory.items.is_empty());
        assert!(ctx.has_space());
        assert!(!ctx.is_night());
        assert!(!ctx.hostile_nearby());
    }

    #[test]
    fn test_has_tool_partial_match() {
        let ctx = TaskContext::new().with_item("iron_pickaxe", 1);
        assert!(ctx.has_tool("pickaxe"));
        assert!(!ctx.has_tool("axe_of_doom"));
    }

    #[test]
    fn test_has_materials_sums_variants() {
        let ctx = TaskContext::new()
            .with_item("oak_planks", 10)
            .with_item("birch_planks", 8);
        assert!(ctx.has_materials("planks", 16));
        assert!(!ctx.has_materials("planks", 20));
    }

    #[test]
    fn test_night_window() {
        assert!(TaskContext::new().with_time(14_000).is_night());
        assert!(!TaskContext::new().with_time(6_000).is_night());
    }

    #[test]
    fn test_block_proximity() {
        let ctx = TaskContext::new().with_block("iron_ore", 8.0);
        assert!((ctx.block_proximity("ore") - 0.75).abs() < 1e-6);
        assert_eq!(ctx.block_proximity("diamond"), 0.0);
    }

    #[test]
    fn test_recent_task_limit() {
        let mut ctx = TaskContext::new();
        for i in 0..15 {
            ctx.push_recent(RecentTask {
                task_type: TaskType::Mining,
                description: format!("task {}", i),
                success: true,
                finished_at: i,
            });
        }
        assert_eq!(ctx.recent_tasks.len(), MAX_RECENT_TASKS);
        assert_eq!(ctx.recent_tasks.last().unwrap().description, "task 14");
        assert_eq!(ctx.recent_tasks[0].description, "task 5");
    }

    #[test]
    fn test_recency_of() {
        let ctx = TaskContext::new()
            .with_recent(RecentTask {
                task_type: TaskType::Mining,
                description: "mine".into(),
                success: true,
                finished_at: 1,
            })
            .with_recent(RecentTask {
                task_type: TaskType::Farming,
                description: "farm".into(),
                success: true,
                finished_at: 2,
            });
        assert_eq!(ctx.recency_of(TaskType::Farming), Some(0));
        assert_eq!(ctx.recency_of(TaskType::Mining), Some(1));
        assert_eq!(ctx.recency_of(TaskType::Combat), None);
    }

    #[test]
    fn test_summary_mentions_surroundings() {
        let ctx = TaskContext::new()
            .with_item("iron_pickaxe", 1)
            .with_block("iron_ore", 3.0)
            .with_entity("zombie", true, 5.0);
        let summary = ctx.summary(5);
        assert!(summary.contains("iron_pickaxe"));
        assert!(summary.contains("iron_ore"));
        assert!(summary.contains("zombie (hostile)"));
    }

    #[test]
    fn test_static_provider_returns_snapshot() {
        let provider = StaticContextProvider::new(TaskContext::new().with_time(15_000));
        assert!(provider.snapshot(Some("Alex")).is_night());
    }
}
