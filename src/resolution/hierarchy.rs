//! Task type hierarchy
//!
//! Each registered type carries its parameter rules, optional sub-types,
//! the keywords used to recognize it in free text and an ordered fallback
//! chain. Fallback chains may refer back to earlier types; traversal is
//! cycle-safe (see `TypeFallbackSystem::follow_resolution_chain`).

use crate::ambiguity::factors::{ContextFactor, WeightedFactor};
use crate::task::context::TaskContext;
use crate::task::types::{TaskParameters, TaskType};
use serde::{Deserialize, Serialize};

/// A parameter rule a task must satisfy to be executable as its type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationRule {
    /// The parameter must be present and non-null
    Required { name: String },
    /// At least one of the parameters must be present
    AnyOf { names: Vec<String> },
    /// If present, the parameter must be one of the allowed strings
    OneOf { name: String, allowed: Vec<String> },
}

impl ValidationRule {
    pub fn required(name: &str) -> Self {
        Self::Required { name: name.into() }
    }

    pub fn any_of(names: &[&str]) -> Self {
        Self::AnyOf {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// Check the rule; on failure returns the parameter names at fault
    pub fn check(&self, params: &TaskParameters) -> Result<(), Vec<String>> {
        let present = |name: &str| params.get(name).map(|v| !v.is_null()).unwrap_or(false);
        match self {
            Self::Required { name } => {
                if present(name) {
                    Ok(())
                } else {
                    Err(vec![name.clone()])
                }
            }
            Self::AnyOf { names } => {
                if names.iter().any(|n| present(n)) {
                    Ok(())
                } else {
                    Err(vec![names.join("|")])
                }
            }
            Self::OneOf { name, allowed } => match params.get(name).and_then(|v| v.as_str()) {
                Some(value) if !allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) => {
                    Err(vec![name.clone()])
                }
                _ => Ok(()),
            },
        }
    }
}

fn check_all(rules: &[ValidationRule], params: &TaskParameters) -> Result<(), Vec<String>> {
    let missing: Vec<String> = rules
        .iter()
        .filter_map(|r| r.check(params).err())
        .flatten()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTypeDefinition {
    pub name: String,
    pub rules: Vec<ValidationRule>,
}

impl SubTypeDefinition {
    pub fn new(name: &str, rules: Vec<ValidationRule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }
}

/// A condition on a fallback rule; all of a rule's conditions must hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", content = "factor", rename_all = "snake_case")]
pub enum FallbackCondition {
    Holds(ContextFactor),
    Lacks(ContextFactor),
    HasParameter(String),
}

impl FallbackCondition {
    pub fn is_met(&self, ctx: &TaskContext, params: &TaskParameters) -> bool {
        match self {
            Self::Holds(factor) => factor.holds(ctx),
            Self::Lacks(factor) => !factor.holds(ctx),
            Self::HasParameter(name) => params.get(name).map(|v| !v.is_null()).unwrap_or(false),
        }
    }
}

/// One link of a fallback chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRule {
    pub candidate: TaskType,
    pub conditions: Vec<FallbackCondition>,
    /// Lower numbers are tried first
    pub priority: u32,
    pub reason: String,
}

impl FallbackRule {
    pub fn new(candidate: TaskType, priority: u32, reason: &str) -> Self {
        Self {
            candidate,
            conditions: Vec::new(),
            priority,
            reason: reason.into(),
        }
    }

    pub fn when(mut self, condition: FallbackCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn applies(&self, ctx: &TaskContext, params: &TaskParameters) -> bool {
        self.conditions.iter().all(|c| c.is_met(ctx, params))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub task_type: TaskType,
    pub description: String,
    /// Words that suggest this type in free text
    pub keywords: Vec<String>,
    /// Phrases that force this type over whatever was declared
    pub override_keywords: Vec<String>,
    pub rules: Vec<ValidationRule>,
    pub sub_types: Vec<SubTypeDefinition>,
    pub fallback_chain: Vec<FallbackRule>,
    /// Confidence before any context is considered
    pub base_score: f64,
    pub context_weights: Vec<WeightedFactor>,
    /// Weight of the type's recorded execution success rate
    pub historical_weight: f64,
}

impl TypeDefinition {
    pub fn new(task_type: TaskType, description: &str) -> Self {
        Self {
            task_type,
            description: description.into(),
            keywords: Vec::new(),
            override_keywords: Vec::new(),
            rules: Vec::new(),
            sub_types: Vec::new(),
            fallback_chain: Vec::new(),
            base_score: 0.5,
            context_weights: Vec::new(),
            historical_weight: 0.2,
        }
    }

    pub fn keywords(mut self, words: &[&str]) -> Self {
        self.keywords = words.iter().map(|w| w.to_string()).collect();
        self
    }

    pub fn overrides(mut self, phrases: &[&str]) -> Self {
        self.override_keywords = phrases.iter().map(|w| w.to_string()).collect();
        self
    }

    pub fn rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn sub_type(mut self, sub_type: SubTypeDefinition) -> Self {
        self.sub_types.push(sub_type);
        self
    }

    pub fn fallback(mut self, rule: FallbackRule) -> Self {
        self.fallback_chain.push(rule);
        self
    }

    pub fn scoring(mut self, base_score: f64, weights: Vec<(ContextFactor, f64)>) -> Self {
        self.base_score = base_score;
        self.context_weights = weights
            .into_iter()
            .map(|(f, w)| WeightedFactor::new(f, w))
            .collect();
        self
    }

    /// Number of keyword hits in normalized, space-padded text
    fn keyword_hits(&self, padded: &str) -> usize {
        self.keywords
            .iter()
            .filter(|k| padded.contains(&format!(" {} ", k)))
            .count()
    }

    fn override_hit(&self, padded: &str) -> bool {
        self.override_keywords
            .iter()
            .any(|k| padded.contains(&format!(" {} ", k)))
    }
}

/// Registered type definitions, in registration order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeHierarchy {
    definitions: Vec<TypeDefinition>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition, replacing any existing one for the same type
    pub fn register(&mut self, definition: TypeDefinition) {
        if let Some(existing) = self
            .definitions
            .iter_mut()
            .find(|d| d.task_type == definition.task_type)
        {
            *existing = definition;
        } else {
            self.definitions.push(definition);
        }
    }

    pub fn get(&self, task_type: TaskType) -> Option<&TypeDefinition> {
        self.definitions.iter().find(|d| d.task_type == task_type)
    }

    pub fn contains(&self, task_type: TaskType) -> bool {
        self.get(task_type).is_some()
    }

    pub fn definitions(&self) -> &[TypeDefinition] {
        &self.definitions
    }

    /// Validate parameters against a type's rules
    ///
    /// An unregistered type has no rules to satisfy and is rejected by the
    /// resolver before it gets here.
    pub fn validate_parameters(
        &self,
        task_type: TaskType,
        params: &TaskParameters,
    ) -> Result<(), Vec<String>> {
        match self.get(task_type) {
            Some(def) => check_all(&def.rules, params),
            None => Ok(()),
        }
    }

    /// Whether `sub_type` is declared for the type and its rules pass
    pub fn validate_sub_type(&self, task_type: TaskType, sub_type: &str, params: &TaskParameters) -> bool {
        self.get(task_type)
            .and_then(|def| {
                def.sub_types
                    .iter()
                    .find(|st| st.name.eq_ignore_ascii_case(sub_type.trim()))
            })
            .map(|st| check_all(&st.rules, params).is_ok())
            .unwrap_or(false)
    }

    /// Type with the most keyword hits in `text`; ties go to the earlier definition
    pub fn keyword_match(&self, text: &str) -> Option<TaskType> {
        let padded = pad(text);
        let mut best: Option<(TaskType, usize)> = None;
        for def in &self.definitions {
            let hits = def.keyword_hits(&padded);
            if hits > 0 && best.map(|(_, b)| hits > b).unwrap_or(true) {
                best = Some((def.task_type, hits));
            }
        }
        best.map(|(t, _)| t)
    }

    /// The single type whose override phrases appear in `text`, if exactly one does
    pub fn override_match(&self, text: &str) -> Option<TaskType> {
        let padded = pad(text);
        let mut hits = self
            .definitions
            .iter()
            .filter(|d| d.override_hit(&padded))
            .map(|d| d.task_type);
        match (hits.next(), hits.next()) {
            (Some(t), None) => Some(t),
            _ => None,
        }
    }

    /// The built-in hierarchy for the agent's ten task types
    pub fn default_hierarchy() -> Self {
        use ContextFactor as F;
        use FallbackCondition::{HasParameter, Holds, Lacks};

        let mut h = Self::new();

        h.register(
            TypeDefinition::new(TaskType::Navigation, "travel to coordinates, a landmark or a player")
                .keywords(&["go", "walk", "travel", "move", "navigate", "head", "come", "follow", "return"])
                .overrides(&["come here", "follow me"])
                .rule(ValidationRule::any_of(&["coordinates", "destination", "landmark", "target"]))
                .sub_type(SubTypeDefinition::new("coordinates", vec![ValidationRule::required("coordinates")]))
                .sub_type(SubTypeDefinition::new(
                    "landmark",
                    vec![ValidationRule::any_of(&["destination", "landmark"])],
                ))
                .sub_type(SubTypeDefinition::new("follow", vec![ValidationRule::required("target")]))
                .fallback(
                    FallbackRule::new(TaskType::Exploration, 1, "destination is not reachable yet")
                        .when(Lacks(F::DestinationReachable)),
                )
                .scoring(0.5, vec![(F::PathClear, 0.15), (F::DestinationReachable, 0.15)]),
        );

        h.register(
            TypeDefinition::new(TaskType::Exploration, "search for structures, biomes or unknown areas")
                .keywords(&["explore", "find", "search", "scout", "locate", "discover", "village", "temple"])
                .overrides(&["look around"])
                .sub_type(SubTypeDefinition::new("structure", vec![]))
                .sub_type(SubTypeDefinition::new("biome", vec![]))
                .sub_type(SubTypeDefinition::new("area", vec![]))
                .fallback(
                    FallbackRule::new(TaskType::Navigation, 1, "explicit coordinates were given")
                        .when(HasParameter("coordinates".into())),
                )
                .scoring(
                    0.45,
                    vec![(F::Daytime, 0.15), (F::Healthy, 0.1), (F::HasInventorySpace, 0.05)],
                ),
        );

        h.register(
            TypeDefinition::new(TaskType::Mining, "break stone or ore with a pickaxe")
                .keywords(&["mine", "dig", "ore", "iron", "coal", "diamond", "gold", "stone", "quarry"])
                .overrides(&["strip mine", "branch mine"])
                .rule(ValidationRule::any_of(&["block", "resource", "target"]))
                .sub_type(SubTypeDefinition::new("ore", vec![ValidationRule::any_of(&["block", "resource"])]))
                .sub_type(SubTypeDefinition::new("strip", vec![]))
                .sub_type(SubTypeDefinition::new("tunnel", vec![]))
                .fallback(
                    FallbackRule::new(TaskType::Gathering, 1, "no pickaxe, but trees are close")
                        .when(Lacks(F::HasTool("pickaxe".into())))
                        .when(Holds(F::NearBlock("log".into()))),
                )
                .fallback(
                    FallbackRule::new(TaskType::Exploration, 2, "no ore in range")
                        .when(Lacks(F::NearBlock("ore".into()))),
                )
                .scoring(
                    0.4,
                    vec![
                        (F::HasTool("pickaxe".into()), 0.2),
                        (F::NearBlock("ore".into()), 0.1),
                        (F::HasInventorySpace, 0.05),
                    ],
                ),
        );

        h.register(
            TypeDefinition::new(TaskType::Farming, "till, plant and harvest crops")
                .keywords(&["farm", "harvest", "plant", "sow", "till", "wheat", "carrots", "potatoes", "crops"])
                .overrides(&["harvest", "replant"])
                .rule(ValidationRule::any_of(&["crop", "seed", "target", "area"]))
                .sub_type(SubTypeDefinition::new("harvest", vec![]))
                .sub_type(SubTypeDefinition::new("plant", vec![ValidationRule::any_of(&["crop", "seed"])]))
                .sub_type(SubTypeDefinition::new("till", vec![]))
                .fallback(
                    FallbackRule::new(TaskType::Gathering, 1, "no hoe; collect what is growing instead")
                        .when(Lacks(F::HasTool("hoe".into()))),
                )
                .scoring(
                    0.4,
                    vec![
                        (F::HasTool("hoe".into()), 0.15),
                        (F::NearBlock("farmland".into()), 0.15),
                        (F::HasMaterial("seeds".into()), 0.1),
                    ],
                ),
        );

        h.register(
            TypeDefinition::new(TaskType::Building, "place blocks to build a structure")
                .keywords(&["build", "construct", "place", "house", "wall", "bridge", "shelter", "tower"])
                .rule(ValidationRule::any_of(&["structure", "block", "blueprint"]))
                .sub_type(SubTypeDefinition::new(
                    "structure",
                    vec![ValidationRule::any_of(&["structure", "blueprint"])],
                ))
                .sub_type(SubTypeDefinition::new("bridge", vec![]))
                .sub_type(SubTypeDefinition::new("wall", vec![]))
                .fallback(
                    FallbackRule::new(TaskType::Gathering, 1, "no building blocks in the inventory")
                        .when(Lacks(F::HasMaterial("planks".into())))
                        .when(Lacks(F::HasMaterial("cobblestone".into()))),
                )
                .scoring(
                    0.4,
                    vec![
                        (F::HasMaterial("planks".into()), 0.15),
                        (F::HasMaterial("cobblestone".into()), 0.1),
                        (F::PathClear, 0.1),
                    ],
                ),
        );

        h.register(
            TypeDefinition::new(TaskType::Crafting, "combine items at a crafting table or furnace")
                .keywords(&["craft", "make", "smelt", "forge", "cook", "pickaxe", "sword", "tools"])
                .overrides(&["craft", "smelt"])
                .rule(ValidationRule::any_of(&["item", "recipe", "target"]))
                .sub_type(SubTypeDefinition::new("craft", vec![]))
                .sub_type(SubTypeDefinition::new("smelt", vec![ValidationRule::any_of(&["item", "recipe"])]))
                .fallback(
                    FallbackRule::new(TaskType::Mining, 1, "ingredients must be mined first")
                        .when(Lacks(F::HasMaterial("ingot".into())))
                        .when(Holds(F::HasTool("pickaxe".into()))),
                )
                .fallback(
                    FallbackRule::new(TaskType::Gathering, 2, "no planks to craft with")
                        .when(Lacks(F::HasMaterial("planks".into()))),
                )
                .scoring(
                    0.45,
                    vec![
                        (F::NearBlock("crafting_table".into()), 0.2),
                        (F::HasMaterial("planks".into()), 0.1),
                    ],
                ),
        );

        h.register(
            TypeDefinition::new(TaskType::Gathering, "collect wood, drops and other loose resources")
                .keywords(&["gather", "collect", "chop", "wood", "logs", "pick", "get", "fetch"])
                .overrides(&["chop"])
                .rule(ValidationRule::any_of(&["resource", "item", "block", "target"]))
                .sub_type(SubTypeDefinition::new("wood", vec![]))
                .sub_type(SubTypeDefinition::new("drops", vec![]))
                .sub_type(SubTypeDefinition::new("plants", vec![]))
                .fallback(
                    FallbackRule::new(TaskType::Mining, 1, "the resource is underground and a pickaxe is at hand")
                        .when(Holds(F::HasTool("pickaxe".into())))
                        .when(Holds(F::NearBlock("ore".into()))),
                )
                .fallback(
                    FallbackRule::new(TaskType::Farming, 2, "farmland is close")
                        .when(Holds(F::NearBlock("farmland".into()))),
                )
                .scoring(
                    0.45,
                    vec![
                        (F::HasTool("axe".into()), 0.1),
                        (F::NearBlock("log".into()), 0.15),
                        (F::HasInventorySpace, 0.1),
                    ],
                ),
        );

        h.register(
            TypeDefinition::new(TaskType::Combat, "attack or defend against entities")
                .keywords(&["attack", "kill", "fight", "defend", "protect", "slay", "zombie", "skeleton", "creeper"])
                .overrides(&["attack", "kill", "fight"])
                .rule(ValidationRule::any_of(&["target", "entity", "mode"]))
                .sub_type(SubTypeDefinition::new("attack", vec![ValidationRule::any_of(&["target", "entity"])]))
                .sub_type(SubTypeDefinition::new("defend", vec![]))
                .fallback(
                    FallbackRule::new(TaskType::Inventory, 1, "equip a weapon first")
                        .when(Lacks(F::HasTool("sword".into())))
                        .when(HasParameter("item".into())),
                )
                .scoring(
                    0.4,
                    vec![(F::HasTool("sword".into()), 0.15), (F::HostileNearby, 0.2)],
                ),
        );

        h.register(
            TypeDefinition::new(TaskType::Inventory, "sort, store, drop or equip items")
                .keywords(&["drop", "store", "deposit", "equip", "sort", "stash", "chest", "inventory"])
                .overrides(&["empty your inventory", "put away"])
                .rule(ValidationRule::any_of(&["action", "item"]))
                .sub_type(SubTypeDefinition::new("store", vec![]))
                .sub_type(SubTypeDefinition::new("drop", vec![]))
                .sub_type(SubTypeDefinition::new("equip", vec![ValidationRule::required("item")]))
                .sub_type(SubTypeDefinition::new("sort", vec![]))
                .scoring(0.5, vec![(F::NearBlock("chest".into()), 0.2)]),
        );

        h.register(
            TypeDefinition::new(TaskType::Query, "answer a question about the agent's state")
                .keywords(&["what", "where", "how", "status", "show", "tell", "inventory", "health"])
                .overrides(&["status report", "what are you doing"])
                .sub_type(SubTypeDefinition::new("status", vec![]))
                .sub_type(SubTypeDefinition::new("location", vec![]))
                .sub_type(SubTypeDefinition::new("inventory", vec![]))
                .scoring(0.6, vec![]),
        );

        h
    }
}

/// Lowercase words of `text`, joined by single spaces and padded on both ends
fn pad(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    format!(" {} ", words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, serde_json::Value)]) -> TaskParameters {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_default_hierarchy_registers_every_type() {
        let h = TypeHierarchy::default_hierarchy();
        for t in TaskType::ALL {
            assert!(h.contains(t), "missing {}", t);
        }
        assert_eq!(h.definitions().len(), TaskType::ALL.len());
    }

    #[test]
    fn test_navigation_requires_a_destination() {
        let h = TypeHierarchy::default_hierarchy();
        assert!(h.validate_parameters(TaskType::Navigation, &TaskParameters::new()).is_err());
        let p = params(&[("coordinates", json!({"x": 1, "y": 2, "z": 3}))]);
        assert!(h.validate_parameters(TaskType::Navigation, &p).is_ok());
    }

    #[test]
    fn test_null_parameter_counts_as_missing() {
        let h = TypeHierarchy::default_hierarchy();
        let p = params(&[("destination", serde_json::Value::Null)]);
        let missing = h.validate_parameters(TaskType::Navigation, &p).unwrap_err();
        assert_eq!(missing.len(), 1);
    }

    #[test]
    fn test_query_has_no_rules() {
        let h = TypeHierarchy::default_hierarchy();
        assert!(h.validate_parameters(TaskType::Query, &TaskParameters::new()).is_ok());
    }

    #[test]
    fn test_sub_type_validation() {
        let h = TypeHierarchy::default_hierarchy();
        let p = params(&[("destination", json!("village"))]);
        assert!(h.validate_sub_type(TaskType::Navigation, "landmark", &p));
        assert!(!h.validate_sub_type(TaskType::Navigation, "coordinates", &p));
        assert!(!h.validate_sub_type(TaskType::Navigation, "teleport", &p));
    }

    #[test]
    fn test_one_of_rule() {
        let rule = ValidationRule::OneOf {
            name: "mode".into(),
            allowed: vec!["attack".into(), "defend".into()],
        };
        assert!(rule.check(&params(&[("mode", json!("Defend"))])).is_ok());
        assert!(rule.check(&params(&[("mode", json!("flee"))])).is_err());
        assert!(rule.check(&TaskParameters::new()).is_ok());
    }

    #[test]
    fn test_keyword_match_picks_most_hits() {
        let h = TypeHierarchy::default_hierarchy();
        assert_eq!(h.keyword_match("dig for iron ore"), Some(TaskType::Mining));
        assert_eq!(h.keyword_match("chop some wood"), Some(TaskType::Gathering));
        assert_eq!(h.keyword_match("xyzzy"), None);
    }

    #[test]
    fn test_keyword_match_is_whole_word() {
        let h = TypeHierarchy::default_hierarchy();
        // "gold" must not fire inside "goldfish"
        assert_eq!(h.keyword_match("goldfish"), None);
    }

    #[test]
    fn test_override_requires_a_unique_type() {
        let h = TypeHierarchy::default_hierarchy();
        assert_eq!(h.override_match("please harvest the field"), Some(TaskType::Farming));
        assert_eq!(h.override_match("attack and harvest"), None);
        assert_eq!(h.override_match("go to 1 2 3"), None);
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut h = TypeHierarchy::default_hierarchy();
        h.register(TypeDefinition::new(TaskType::Query, "replaced"));
        assert_eq!(h.get(TaskType::Query).unwrap().description, "replaced");
        assert_eq!(h.definitions().len(), TaskType::ALL.len());
    }

    #[test]
    fn test_fallback_rule_needs_every_condition() {
        let rule = FallbackRule::new(TaskType::Gathering, 1, "r")
            .when(FallbackCondition::Lacks(ContextFactor::HasTool("pickaxe".into())))
            .when(FallbackCondition::Holds(ContextFactor::NearBlock("log".into())));
        let empty = TaskParameters::new();
        assert!(!rule.applies(&TaskContext::new(), &empty));
        assert!(rule.applies(&TaskContext::new().with_block("oak_log", 3.0), &empty));
        let armed = TaskContext::new()
            .with_block("oak_log", 3.0)
            .with_item("stone_pickaxe", 1);
        assert!(!rule.applies(&armed, &empty));
    }
}
