//! Build oracle prompts for command parsing
//!
//! The system prompt enumerates the registered task types so the oracle can
//! only answer with names the resolver knows. The user prompt carries a
//! bounded summary of the world snapshot.

use crate::core::config::PromptConfig;
use crate::llm::oracle::OraclePrompt;
use crate::resolution::hierarchy::TypeHierarchy;
use crate::task::context::TaskContext;

const OUTPUT_CONTRACT: &str = r#"OUTPUT FORMAT (JSON only, no explanation):
{
  "task_type": "one of the task types above",
  "sub_type": "one of the listed sub-types or null",
  "description": "short imperative description of the task",
  "parameters": { "key": "value" },
  "priority": "critical|high|normal|low",
  "confidence": 0.0-1.0
}

Examples:
"go to 100 64 -200" -> {"task_type": "navigation", "sub_type": "coordinates", "description": "walk to 100 64 -200", "parameters": {"coordinates": {"x": 100, "y": 64, "z": -200}}, "priority": "normal", "confidence": 0.95}
"mine some iron" -> {"task_type": "mining", "sub_type": "ore", "description": "mine iron ore", "parameters": {"block": "iron_ore", "count": 8}, "priority": "normal", "confidence": 0.85}
"get me wheat" -> {"task_type": "farming", "sub_type": "harvest", "description": "harvest wheat", "parameters": {"crop": "wheat"}, "priority": "normal", "confidence": 0.7}"#;

const STRICT_SUFFIX: &str = "\n\nYour previous answer could not be parsed. Respond with exactly one JSON object and nothing else.";

/// Builds prompts from the registered type hierarchy
pub struct PromptBuilder {
    system: String,
    config: PromptConfig,
}

impl PromptBuilder {
    pub fn new(hierarchy: &TypeHierarchy, config: PromptConfig) -> Self {
        Self {
            system: system_prompt(hierarchy),
            config,
        }
    }

    /// Prompt for a command; `strict` is used after an unparseable answer
    pub fn build(&self, command: &str, context: &TaskContext, strict: bool) -> OraclePrompt {
        let mut system = self.system.clone();
        if strict {
            system.push_str(STRICT_SUFFIX);
        }

        let user = format!(
            "CONTEXT:\n{}\nPLAYER COMMAND:\n{}\n\nParse this command into JSON:",
            context.summary(self.config.max_context_items),
            command.trim()
        );

        OraclePrompt { system, user }
    }
}

fn system_prompt(hierarchy: &TypeHierarchy) -> String {
    let mut s = String::from(
        "You interpret chat commands given to an autonomous game agent.\n\
         Convert each command into exactly one structured task.\n\nAVAILABLE TASK TYPES:\n",
    );

    for def in hierarchy.definitions() {
        s.push_str(&format!("- {}: {}", def.task_type, def.description));
        if !def.sub_types.is_empty() {
            let names: Vec<&str> = def.sub_types.iter().map(|st| st.name.as_str()).collect();
            s.push_str(&format!(" (sub-types: {})", names.join(", ")));
        }
        s.push('\n');
    }

    s.push('\n');
    s.push_str(OUTPUT_CONTRACT);
    s
}
