//! Ambiguity patterns: regex matchers that vote for a task type
//!
//! Several patterns may fire for one command ("get iron" reads as both mining
//! and gathering). The detector scores every pattern that fires and decides
//! whether the vote is too close to call.

use crate::ambiguity::factors::{ContextFactor, WeightedFactor};
use crate::task::types::TaskType;
use regex::Regex;

/// A matcher for one reading of a command
#[derive(Debug, Clone)]
pub struct AmbiguityPattern {
    pub id: String,
    pub task_type: TaskType,
    matcher: Regex,
    /// Raw confidence below this is halved
    pub threshold: f64,
    /// How narrowly the pattern describes its type (0.0 - 1.0)
    pub specificity: f64,
    /// Context factors this reading depends on
    pub factors: Vec<WeightedFactor>,
}

/// A pattern that fired, with the span it covered
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub start: usize,
    pub end: usize,
}

impl PatternMatch {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl AmbiguityPattern {
    pub fn new(
        id: impl Into<String>,
        task_type: TaskType,
        pattern: &str,
        threshold: f64,
        specificity: f64,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            id: id.into(),
            task_type,
            matcher: Regex::new(pattern)?,
            threshold: threshold.clamp(0.0, 1.0),
            specificity: specificity.clamp(0.0, 1.0),
            factors: Vec::new(),
        })
    }

    pub fn with_factor(mut self, factor: ContextFactor, weight: f64) -> Self {
        self.factors.push(WeightedFactor::new(factor, weight));
        self
    }

    /// Match against an already normalized command
    pub fn find(&self, normalized: &str) -> Option<PatternMatch> {
        self.matcher
            .find(normalized)
            .filter(|m| !m.as_str().is_empty())
            .map(|m| PatternMatch {
                start: m.start(),
                end: m.end(),
            })
    }

    /// Confidence from match completeness, specificity and threshold
    pub fn match_confidence(&self, matched: &PatternMatch, command_len: usize) -> f64 {
        if command_len == 0 {
            return 0.0;
        }
        let completeness = (matched.len() as f64 / command_len as f64).clamp(0.0, 1.0);
        let raw = 0.5 * completeness + 0.5 * self.specificity;
        let confidence = if raw < self.threshold { raw * 0.5 } else { raw };
        confidence.clamp(0.0, 1.0)
    }
}

const ORES: &str = "iron|gold|coal|diamond|diamonds|copper|redstone|lapis|emerald|emeralds|ore|ores";
const STRUCTURES: &str =
    "village|temple|cave|ravine|stronghold|structure|biome|ocean|desert|mountain|mineshaft";

/// The built-in pattern set
pub fn default_patterns() -> Vec<AmbiguityPattern> {
    let specs: Vec<(AmbiguityPattern, Vec<(ContextFactor, f64)>)> = vec![
        (
            pattern(
                "navigate_coordinates",
                TaskType::Navigation,
                r"\b(?:go|move|walk|run|travel|head|navigate|come)\s+(?:to\s+)?-?\d+(?:\.\d+)?[\s,]+-?\d+(?:\.\d+)?[\s,]+-?\d+(?:\.\d+)?",
                0.6,
                1.0,
            ),
            vec![
                (ContextFactor::PathClear, 0.6),
                (ContextFactor::DestinationReachable, 0.4),
            ],
        ),
        (
            pattern(
                "navigate_landmark",
                TaskType::Navigation,
                r"\b(?:go|move|walk|run|travel|head)\s+(?:back\s+)?(?:to|towards)\s+(?:the\s+|a\s+|an\s+)?[a-z][a-z_ ]*",
                0.5,
                0.6,
            ),
            vec![
                (ContextFactor::PathClear, 0.5),
                (ContextFactor::DestinationReachable, 0.5),
            ],
        ),
        (
            pattern(
                "explore_structure",
                TaskType::Exploration,
                &format!(
                    r"\b(?:find|explore|search for|look for|locate|go to|head to|travel to)\s+(?:a\s+|an\s+|the\s+|some\s+)?(?:nearest\s+)?(?:{})s?\b",
                    STRUCTURES
                ),
                0.5,
                0.6,
            ),
            vec![
                (ContextFactor::HasTool("compass".into()), 0.4),
                (ContextFactor::HasMaterial("map".into()), 0.4),
                (ContextFactor::HasInventorySpace, 0.2),
            ],
        ),
        (
            pattern(
                "mine_block",
                TaskType::Mining,
                r"\b(?:mine|dig|excavate|quarry)\b(?:\s+(?:up\s+)?(?:some\s+)?[a-z_]+)?",
                0.5,
                0.8,
            ),
            vec![
                (ContextFactor::HasTool("pickaxe".into()), 0.5),
                (ContextFactor::NearBlock("ore".into()), 0.3),
                (ContextFactor::HasInventorySpace, 0.2),
            ],
        ),
        (
            pattern(
                "collect_ore",
                TaskType::Mining,
                &format!(
                    r"\b(?:get|collect|gather|find)\s+(?:me\s+)?(?:some\s+)?(?:{})\b",
                    ORES
                ),
                0.5,
                0.7,
            ),
            vec![
                (ContextFactor::HasTool("pickaxe".into()), 0.6),
                (ContextFactor::NearBlock("ore".into()), 0.4),
            ],
        ),
        (
            pattern(
                "gather_resource",
                TaskType::Gathering,
                r"\b(?:get|collect|gather|chop|cut|pick up)\s+(?:me\s+)?(?:some\s+)?(?:the\s+)?[a-z_]+",
                0.4,
                0.5,
            ),
            vec![
                (ContextFactor::HasTool("axe".into()), 0.3),
                (ContextFactor::NearBlock("log".into()), 0.4),
                (ContextFactor::HasInventorySpace, 0.3),
            ],
        ),
        (
            pattern(
                "farm_crop",
                TaskType::Farming,
                r"\b(?:farm|harvest|plant|sow|till|replant)\b(?:\s+(?:some\s+)?(?:the\s+)?[a-z_]+)?",
                0.5,
                0.8,
            ),
            vec![
                (ContextFactor::HasTool("hoe".into()), 0.3),
                (ContextFactor::NearBlock("farmland".into()), 0.4),
                (ContextFactor::HasMaterial("seeds".into()), 0.3),
            ],
        ),
        (
            pattern(
                "build_structure",
                TaskType::Building,
                r"\b(?:build|construct|place|make)\s+(?:a\s+|an\s+|the\s+|some\s+)?[a-z_]+",
                0.5,
                0.6,
            ),
            vec![
                (ContextFactor::HasMaterial("planks".into()), 0.4),
                (ContextFactor::HasMaterial("cobblestone".into()), 0.3),
                (ContextFactor::PathClear, 0.3),
            ],
        ),
        (
            pattern(
                "craft_item",
                TaskType::Crafting,
                r"\b(?:craft|make|smelt|forge|cook)\s+(?:a\s+|an\s+|some\s+)?[a-z_]+",
                0.5,
                0.6,
            ),
            vec![
                (ContextFactor::NearBlock("crafting_table".into()), 0.5),
                (ContextFactor::HasMaterial("planks".into()), 0.25),
                (ContextFactor::HasMaterial("ingot".into()), 0.25),
            ],
        ),
        (
            pattern(
                "attack_entity",
                TaskType::Combat,
                r"\b(?:attack|kill|fight|slay|defend|protect)\b(?:\s+(?:the\s+|that\s+)?[a-z_]+)?",
                0.5,
                0.8,
            ),
            vec![
                (ContextFactor::HasTool("sword".into()), 0.4),
                (ContextFactor::HostileNearby, 0.6),
            ],
        ),
        (
            pattern(
                "manage_inventory",
                TaskType::Inventory,
                r"\b(?:drop|store|deposit|equip|sort|stash|empty)\b(?:\s+(?:my\s+|the\s+|your\s+|all\s+)?[a-z_]+)?",
                0.5,
                0.7,
            ),
            vec![(ContextFactor::NearBlock("chest".into()), 1.0)],
        ),
        (
            pattern(
                "status_query",
                TaskType::Query,
                r"^(?:what|where|how|do you|are you|can you|show|tell me|status)\b.*",
                0.4,
                0.5,
            ),
            vec![],
        ),
    ];

    specs
        .into_iter()
        .map(|(p, factors)| {
            factors
                .into_iter()
                .fold(p, |p, (factor, weight)| p.with_factor(factor, weight))
        })
        .collect()
}

fn pattern(
    id: &str,
    task_type: TaskType,
    regex: &str,
    threshold: f64,
    specificity: f64,
) -> AmbiguityPattern {
    AmbiguityPattern::new(id, task_type, regex, threshold, specificity)
        .expect("built-in ambiguity patterns are valid regexes")
}
