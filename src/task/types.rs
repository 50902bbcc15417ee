//! Task and command data model
//!
//! A `Task` is the only thing this crate hands to the executor side. It is
//! produced from a `TaskDraft`, which still carries the type exactly as the
//! oracle declared it (possibly a name no definition knows about).

use crate::core::types::{normalize_command, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Free-form task parameters as returned by the oracle
pub type TaskParameters = BTreeMap<String, serde_json::Value>;

/// Unique identifier for resolved tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Kinds of work the agent knows how to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Travel to coordinates, a landmark or a player
    Navigation,
    /// Search for structures or biomes
    Exploration,
    /// Break blocks with tools, usually ore or stone
    Mining,
    /// Till, plant and harvest crops
    Farming,
    /// Place blocks to build structures
    Building,
    /// Combine items at a crafting table or furnace
    Crafting,
    /// Collect loose resources (wood, drops, flowers)
    Gathering,
    /// Attack or defend against entities
    Combat,
    /// Sort, store, drop or equip items
    Inventory,
    /// Answer a question about the agent's state; never changes the world
    Query,
}

impl TaskType {
    pub const ALL: [TaskType; 10] = [
        TaskType::Navigation,
        TaskType::Exploration,
        TaskType::Mining,
        TaskType::Farming,
        TaskType::Building,
        TaskType::Crafting,
        TaskType::Gathering,
        TaskType::Combat,
        TaskType::Inventory,
        TaskType::Query,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Exploration => "exploration",
            Self::Mining => "mining",
            Self::Farming => "farming",
            Self::Building => "building",
            Self::Crafting => "crafting",
            Self::Gathering => "gathering",
            Self::Combat => "combat",
            Self::Inventory => "inventory",
            Self::Query => "query",
        }
    }

    /// Look up a type by its wire name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task priority levels with explicit ordering values
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskPriority {
    Low = 0,
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// A raw chat command as received from the front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub text: String,
    pub player: Option<String>,
    pub timestamp: Timestamp,
}

impl Command {
    pub fn new(text: impl Into<String>, player: Option<String>, timestamp: Timestamp) -> Self {
        Self {
            text: text.into(),
            player,
            timestamp,
        }
    }

    /// Key under which this command is cached and confirmed
    pub fn key(&self) -> String {
        normalize_command(&self.text)
    }
}

/// Where a task came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOrigin {
    pub command: String,
    pub player: Option<String>,
}

/// A task before type validation
///
/// `declared_type` is kept as text because the oracle may answer with a type
/// the hierarchy does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub declared_type: String,
    pub sub_type: Option<String>,
    pub description: String,
    pub parameters: TaskParameters,
    pub priority: TaskPriority,
    pub confidence: f64,
    pub origin: TaskOrigin,
    /// Ids of the ambiguity patterns that fired, with the type each one voted for
    pub pattern_votes: Vec<(String, TaskType)>,
    /// Set once a user explicitly picked the type; disables overrides and fallbacks
    pub locked: bool,
}

impl TaskDraft {
    pub fn new(declared_type: impl Into<String>, origin: TaskOrigin) -> Self {
        Self {
            declared_type: declared_type.into(),
            sub_type: None,
            description: String::new(),
            parameters: TaskParameters::new(),
            priority: TaskPriority::Normal,
            confidence: 0.0,
            origin,
            pattern_votes: Vec::new(),
            locked: false,
        }
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.declared_type = task_type.as_str().to_string();
        self
    }

    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = Some(sub_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn declared(&self) -> Option<TaskType> {
        TaskType::from_name(&self.declared_type)
    }

    pub fn has_parameter(&self, key: &str) -> bool {
        self.parameters
            .get(key)
            .map(|v| !v.is_null())
            .unwrap_or(false)
    }

    /// Text searched for type keywords: the description followed by the command
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.description, self.origin.command).to_lowercase()
    }
}

/// A validated, typed, executable task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: TaskType,
    pub sub_type: Option<String>,
    pub description: String,
    pub parameters: TaskParameters,
    pub priority: TaskPriority,
    pub confidence: f64,
    pub origin: TaskOrigin,
    pub pattern_votes: Vec<(String, TaskType)>,
    pub created_at: Timestamp,
}

impl Task {
    pub fn from_draft(draft: TaskDraft, task_type: TaskType, created_at: Timestamp) -> Self {
        Self {
            id: TaskId::new(),
            task_type,
            sub_type: draft.sub_type,
            description: draft.description,
            parameters: draft.parameters,
            priority: draft.priority,
            confidence: draft.confidence,
            origin: draft.origin,
            pattern_votes: draft.pattern_votes,
            created_at,
        }
    }
}
