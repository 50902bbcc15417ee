//! Task type resolution - turns a `TaskDraft` into a validated `Task`

use crate::core::config::ResolutionConfig;
use crate::core::error::{PipelineError, Result};
use crate::core::types::{clamp_unit, token_similarity, Clock};
use crate::resolution::fallback::TypeFallbackSystem;
use crate::resolution::hierarchy::TypeHierarchy;
use crate::task::context::TaskContext;
use crate::task::types::{Task, TaskDraft, TaskType};
use std::sync::Arc;

/// Type used when nothing else about a command can be recognized
pub const SAFE_FALLBACK_TYPE: TaskType = TaskType::Query;

/// How the final type was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSource {
    /// The declared type passed validation as is
    Declared,
    /// A recent task with a near-identical description
    RecentTask,
    /// An override phrase in the command
    OverrideKeyword,
    /// The declared type was unknown; matched by keywords
    KeywordFallback,
    /// Nothing matched; the safe generic type
    SafeDefault,
    /// A condition-satisfying fallback rule replaced the declared type
    FallbackChain,
}

/// A resolved task plus how it was reached
#[derive(Debug, Clone)]
pub struct TypeResolution {
    pub task: Task,
    pub source: TypeSource,
    /// Types tried, in order
    pub resolution_path: Vec<TaskType>,
    /// Anything that changed or was dropped along the way
    pub notes: Vec<String>,
}

pub struct TaskTypeResolver {
    hierarchy: Arc<TypeHierarchy>,
    fallback: Arc<TypeFallbackSystem>,
    config: ResolutionConfig,
    clock: Arc<dyn Clock>,
}

impl TaskTypeResolver {
    pub fn new(
        fallback: Arc<TypeFallbackSystem>,
        config: ResolutionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            hierarchy: fallback.hierarchy().clone(),
            fallback,
            config,
            clock,
        }
    }

    pub fn hierarchy(&self) -> &Arc<TypeHierarchy> {
        &self.hierarchy
    }

    /// Resolve a draft into a task
    pub fn resolve(&self, draft: TaskDraft, context: &TaskContext) -> Result<Task> {
        self.resolve_with_report(draft, context).map(|r| r.task)
    }

    /// Resolve a draft, keeping the notes and path for diagnostics
    ///
    /// Order: context overrides, declared-type check (keyword fallback, then
    /// the safe default), low-confidence fallback, parameter validation with
    /// condition-satisfying alternatives, sub-type check. A parameter failure
    /// with no applicable alternative is returned as an error.
    pub fn resolve_with_report(&self, mut draft: TaskDraft, context: &TaskContext) -> Result<TypeResolution> {
        let mut notes = Vec::new();

        let (mut task_type, mut source) = match self.check_overrides(&draft, context) {
            Some(found) => found,
            None => self.declared_or_fallback(&draft, &mut notes),
        };
        let mut resolution_path = vec![task_type];

        if !draft.locked
            && source == TypeSource::Declared
            && draft.confidence < self.config.keep_threshold
        {
            let outcome = self
                .fallback
                .determine_final_type(task_type, context, &draft.parameters);
            if outcome.final_type != task_type
                && self
                    .hierarchy
                    .validate_parameters(outcome.final_type, &draft.parameters)
                    .is_ok()
            {
                notes.extend(outcome.warnings);
                task_type = outcome.final_type;
                source = TypeSource::FallbackChain;
                draft.confidence = outcome.confidence;
                resolution_path = outcome.resolution_path;
                draft.sub_type = None;
            }
        }

        if let Err(missing) = self.hierarchy.validate_parameters(task_type, &draft.parameters) {
            let replacement = if draft.locked {
                None
            } else {
                let mut alternatives =
                    self.fallback
                        .generate_alternatives(task_type, context, &draft.parameters);
                // Repairs follow chain order rather than confidence
                alternatives.sort_by_key(|alt| alt.priority);
                alternatives
                    .into_iter()
                    .find(|alt| {
                        self.hierarchy
                            .validate_parameters(alt.task_type, &draft.parameters)
                            .is_ok()
                    })
            };

            match replacement {
                Some(alt) => {
                    notes.push(format!(
                        "{} is missing {}; using {} instead: {}",
                        task_type,
                        missing.join(", "),
                        alt.task_type,
                        alt.reason
                    ));
                    tracing::warn!(from = %task_type, to = %alt.task_type, reason = %alt.reason, "parameter fallback applied");
                    task_type = alt.task_type;
                    source = TypeSource::FallbackChain;
                    draft.confidence = draft.confidence.min(alt.confidence);
                    draft.sub_type = None;
                    resolution_path.push(alt.task_type);
                }
                None => {
                    tracing::warn!(%task_type, missing = ?missing, "task parameters failed validation");
                    return Err(PipelineError::MissingParameters { task_type, missing });
                }
            }
        }

        if let Some(sub_type) = draft.sub_type.clone() {
            if !self
                .hierarchy
                .validate_sub_type(task_type, &sub_type, &draft.parameters)
            {
                notes.push(format!("dropped invalid sub-type '{}' for {}", sub_type, task_type));
                tracing::debug!(%task_type, sub_type, "sub-type stripped");
                draft.sub_type = None;
            }
        }

        draft.confidence = clamp_unit(draft.confidence);
        let task = Task::from_draft(draft, task_type, self.clock.now());

        Ok(TypeResolution {
            task,
            source,
            resolution_path,
            notes,
        })
    }

    /// Context-driven overrides; skipped once a user picked the type
    fn check_overrides(&self, draft: &TaskDraft, context: &TaskContext) -> Option<(TaskType, TypeSource)> {
        if draft.locked {
            return None;
        }

        let text = if draft.description.trim().is_empty() {
            draft.origin.command.as_str()
        } else {
            draft.description.as_str()
        };

        let recent = context.recent_tasks.iter().rev().find(|t| {
            t.success
                && self.hierarchy.contains(t.task_type)
                && token_similarity(text, &t.description) >= self.config.recent_override_similarity
        });
        if let Some(recent) = recent {
            tracing::debug!(task_type = %recent.task_type, recent = %recent.description, "recent task override");
            return Some((recent.task_type, TypeSource::RecentTask));
        }

        self.hierarchy
            .override_match(&draft.origin.command)
            .map(|t| {
                tracing::debug!(task_type = %t, "override keyword matched");
                (t, TypeSource::OverrideKeyword)
            })
    }

    fn declared_or_fallback(&self, draft: &TaskDraft, notes: &mut Vec<String>) -> (TaskType, TypeSource) {
        if let Some(t) = draft.declared().filter(|t| self.hierarchy.contains(*t)) {
            return (t, TypeSource::Declared);
        }

        match self.hierarchy.keyword_match(&draft.searchable_text()) {
            Some(t) => {
                notes.push(format!("unknown type '{}'; matched {} by keywords", draft.declared_type, t));
                tracing::warn!(declared = %draft.declared_type, resolved = %t, "keyword type fallback");
                (t, TypeSource::KeywordFallback)
            }
            None => {
                notes.push(format!(
                    "unknown type '{}'; defaulting to {}",
                    draft.declared_type, SAFE_FALLBACK_TYPE
                ));
                tracing::warn!(declared = %draft.declared_type, "no type matched, using safe default");
                (SAFE_FALLBACK_TYPE, TypeSource::SafeDefault)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ManualClock;
    use crate::task::context::RecentTask;
    use crate::task::types::TaskOrigin;
    use serde_json::json;

    fn resolver() -> TaskTypeResolver {
        let fallback = Arc::new(TypeFallbackSystem::new(
            Arc::new(TypeHierarchy::default_hierarchy()),
            ResolutionConfig::default(),
        ));
        TaskTypeResolver::new(fallback, ResolutionConfig::default(), Arc::new(ManualClock::new(42)))
    }

    fn draft(declared: &str, command: &str) -> TaskDraft {
        TaskDraft::new(
            declared,
            TaskOrigin {
                command: command.into(),
                player: Some("steve".into()),
            },
        )
        .with_confidence(0.95)
    }

    #[test]
    fn test_valid_declared_type_passes_through() {
        let d = draft("navigation", "go to 100 64 -200")
            .with_sub_type("coordinates")
            .with_parameter("coordinates", json!({"x": 100, "y": 64, "z": -200}));
        let r = resolver().resolve_with_report(d, &TaskContext::new()).unwrap();
        assert_eq!(r.task.task_type, TaskType::Navigation);
        assert_eq!(r.task.sub_type.as_deref(), Some("coordinates"));
        assert_eq!(r.source, TypeSource::Declared);
        assert_eq!(r.task.created_at, 42);
        assert!(r.notes.is_empty());
    }

    #[test]
    fn test_override_keyword_beats_unknown_type() {
        let d = draft("lumberjack", "chop some wood").with_parameter("resource", json!("wood"));
        let r = resolver().resolve_with_report(d, &TaskContext::new()).unwrap();
        assert_eq!(r.task.task_type, TaskType::Gathering);
        assert_eq!(r.source, TypeSource::OverrideKeyword);
    }

    #[test]
    fn test_unknown_type_keyword_fallback() {
        let d = draft("lumberjacking", "collect wood").with_parameter("resource", json!("wood"));
        let r = resolver().resolve_with_report(d, &TaskContext::new()).unwrap();
        assert_eq!(r.task.task_type, TaskType::Gathering);
        assert_eq!(r.source, TypeSource::KeywordFallback);
        assert_eq!(r.notes.len(), 1);
    }

    #[test]
    fn test_unknown_type_without_keywords_defaults_to_query() {
        let d = draft("dance", "do the macarena");
        let r = resolver().resolve_with_report(d, &TaskContext::new()).unwrap();
        assert_eq!(r.task.task_type, SAFE_FALLBACK_TYPE);
        assert_eq!(r.source, TypeSource::SafeDefault);
    }

    #[test]
    fn test_invalid_sub_type_is_stripped_type_kept() {
        let d = draft("navigation", "go to the village")
            .with_sub_type("teleport")
            .with_parameter("destination", json!("village"));
        let r = resolver().resolve_with_report(d, &TaskContext::new()).unwrap();
        assert_eq!(r.task.task_type, TaskType::Navigation);
        assert!(r.task.sub_type.is_none());
        assert_eq!(r.notes.len(), 1);
    }

    #[test]
    fn test_missing_parameters_is_terminal() {
        let d = draft("navigation", "go somewhere");
        let ctx = TaskContext::new().with_path(true, true);
        let err = resolver().resolve(d, &ctx).unwrap_err();
        match err {
            PipelineError::MissingParameters { task_type, missing } => {
                assert_eq!(task_type, TaskType::Navigation);
                assert_eq!(missing.len(), 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_parameters_uses_applicable_fallback_rule() {
        // No pickaxe and trees close by: mining falls back to gathering
        let d = draft("mining", "get me some logs").with_parameter("item", json!("oak_log"));
        let ctx = TaskContext::new().with_block("oak_log", 4.0);
        let r = resolver().resolve_with_report(d, &ctx).unwrap();
        assert_eq!(r.task.task_type, TaskType::Gathering);
        assert_eq!(r.source, TypeSource::FallbackChain);
        assert_eq!(r.resolution_path, vec![TaskType::Mining, TaskType::Gathering]);
    }

    #[test]
    fn test_locked_draft_never_falls_back() {
        let mut d = draft("mining", "get me some logs")
            .with_parameter("item", json!("oak_log"));
        d.locked = true;
        let ctx = TaskContext::new().with_block("oak_log", 4.0);
        assert!(matches!(
            resolver().resolve(d, &ctx),
            Err(PipelineError::MissingParameters { .. })
        ));
    }

    #[test]
    fn test_recent_task_override() {
        let ctx = TaskContext::new().with_recent(RecentTask {
            task_type: TaskType::Farming,
            description: "harvest the wheat field".into(),
            success: true,
            finished_at: 0,
        });
        let d = draft("gathering", "grab the wheat")
            .with_description("harvest the wheat field")
            .with_parameter("crop", json!("wheat"));
        let r = resolver().resolve_with_report(d, &ctx).unwrap();
        assert_eq!(r.task.task_type, TaskType::Farming);
        assert_eq!(r.source, TypeSource::RecentTask);
    }

    #[test]
    fn test_low_confidence_declared_type_may_fall_back() {
        let d = draft("navigation", "go to village")
            .with_parameter("destination", json!("village"))
            .with_confidence(0.4);
        let r = resolver().resolve_with_report(d, &TaskContext::new()).unwrap();
        assert_eq!(r.task.task_type, TaskType::Exploration);
        assert_eq!(r.source, TypeSource::FallbackChain);
        assert!(!r.notes.is_empty());
    }

    #[test]
    fn test_locked_low_confidence_is_kept() {
        let mut d = draft("navigation", "go to village")
            .with_parameter("destination", json!("village"))
            .with_confidence(0.4);
        d.locked = true;
        let r = resolver().resolve_with_report(d, &TaskContext::new()).unwrap();
        assert_eq!(r.task.task_type, TaskType::Navigation);
    }
}
