//! Command parsing pipeline
//!
//! `TaskParser` turns one chat command into a resolved `Task`, or into a
//! pending confirmation when the command is ambiguous and context cannot
//! settle it:
//!
//! cache -> prompt -> oracle -> response -> ambiguity -> disambiguation ->
//! confirmation -> type resolution -> schema -> cache
//!
//! The oracle call is the only suspension point apart from recovery backoff.

use crate::ambiguity::detector::AmbiguityDetector;
use crate::ambiguity::patterns::AmbiguityPattern;
use crate::command::cache::{CacheStats, CommandCache};
use crate::command::confirmation::{ConfirmationDecision, ConfirmationPrompt, UserConfirmationHandler};
use crate::core::config::ParserConfig;
use crate::core::error::PipelineError;
use crate::core::types::{clamp_unit, normalize_command, Clock, SystemClock};
use crate::disambiguation::disambiguator::ContextDisambiguator;
use crate::disambiguation::history::HistoricalPatternStore;
use crate::llm::oracle::{OracleError, TextOracle};
use crate::llm::prompt::PromptBuilder;
use crate::llm::response::{enrich_parameters, parse_response, ParsedResponse};
use crate::recovery::handler::{BaseErrorHandler, ErrorContext, LoggingErrorHandler, ParsingError, ParsingErrorHandler};
use crate::recovery::manager::{Backoff, ErrorRecoveryManager, RecoveryAction, RecoveryStrategy, RetryRequest};
use crate::recovery::taxonomy::ParsingErrorCategory;
use crate::resolution::fallback::TypeFallbackSystem;
use crate::resolution::hierarchy::TypeHierarchy;
use crate::resolution::resolver::TaskTypeResolver;
use crate::task::context::{ContextProvider, TaskContext};
use crate::task::schema::{BasicSchemaValidator, SchemaValidator};
use crate::task::types::{Command, Task, TaskDraft, TaskOrigin, TaskType};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Result of a successful `parse`
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Resolved(Task),
    AwaitingConfirmation(ConfirmationPrompt),
}

impl ParseOutcome {
    pub fn task(&self) -> Option<&Task> {
        match self {
            Self::Resolved(task) => Some(task),
            Self::AwaitingConfirmation(_) => None,
        }
    }

    pub fn prompt(&self) -> Option<&ConfirmationPrompt> {
        match self {
            Self::Resolved(_) => None,
            Self::AwaitingConfirmation(prompt) => Some(prompt),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParserStats {
    pub cache: CacheStats,
    pub pending_confirmations: usize,
    pub historical_patterns: usize,
}

/// Raise confidence when the oracle independently agrees
///
/// `c + (1 - c) * weight * oracle_confidence`; never lowers `c`.
pub fn corroborate(confidence: f64, oracle_confidence: f64, weight: f64) -> f64 {
    let c = clamp_unit(confidence);
    clamp_unit(c + (1.0 - c) * clamp_unit(weight) * clamp_unit(oracle_confidence))
}

/// Recovery step for service errors: succeed only if the oracle answers a probe
struct AvailabilityProbe {
    oracle: Arc<dyn TextOracle>,
}

#[async_trait]
impl RecoveryAction for AvailabilityProbe {
    async fn execute(&self, _error: &ParsingError) -> bool {
        match self.oracle.check_availability().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "oracle availability probe failed");
                false
            }
        }
    }
}

pub struct TaskParserBuilder {
    oracle: Arc<dyn TextOracle>,
    context_provider: Arc<dyn ContextProvider>,
    config: ParserConfig,
    clock: Arc<dyn Clock>,
    schema: Arc<dyn SchemaValidator>,
    hierarchy: TypeHierarchy,
    patterns: Option<Vec<AmbiguityPattern>>,
    base_handler: Arc<dyn BaseErrorHandler>,
}

impl TaskParserBuilder {
    pub fn config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn schema_validator(mut self, schema: Arc<dyn SchemaValidator>) -> Self {
        self.schema = schema;
        self
    }

    pub fn hierarchy(mut self, hierarchy: TypeHierarchy) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    pub fn patterns(mut self, patterns: Vec<AmbiguityPattern>) -> Self {
        self.patterns = Some(patterns);
        self
    }

    pub fn base_error_handler(mut self, handler: Arc<dyn BaseErrorHandler>) -> Self {
        self.base_handler = handler;
        self
    }

    pub fn build(self) -> TaskParser {
        let config = self.config;
        let clock = self.clock;

        let detector = Arc::new(match self.patterns {
            Some(patterns) => AmbiguityDetector::with_patterns(patterns, config.ambiguity.clone()),
            None => AmbiguityDetector::new(config.ambiguity.clone()),
        });
        let history = Arc::new(HistoricalPatternStore::new(config.history.clone()));
        let disambiguator = Arc::new(ContextDisambiguator::new(history, clock.clone()));
        let confirmation =
            UserConfirmationHandler::new(disambiguator.clone(), config.confirmation.clone(), clock.clone());

        let hierarchy = Arc::new(self.hierarchy);
        let prompts = PromptBuilder::new(&hierarchy, config.prompt.clone());
        let fallback = Arc::new(TypeFallbackSystem::new(hierarchy, config.resolution.clone()));
        let resolver = TaskTypeResolver::new(fallback.clone(), config.resolution.clone(), clock.clone());
        let cache = CommandCache::new(config.cache.clone(), clock.clone());

        let backoff = Backoff::Exponential {
            base_ms: config.recovery.base_delay_ms,
            max_ms: config.recovery.max_delay_ms,
        };
        let mut recovery = ErrorRecoveryManager::new(&config.recovery, self.base_handler);
        recovery.register_strategy(
            ParsingErrorCategory::ServiceError,
            RecoveryStrategy::new(
                "probe_and_retry",
                backoff,
                Arc::new(AvailabilityProbe {
                    oracle: self.oracle.clone(),
                }),
            ),
        );
        recovery.register_strategy(
            ParsingErrorCategory::ResponseParsing,
            RecoveryStrategy::new("strict_prompt", backoff, Arc::new(RetryRequest)),
        );
        recovery.register_strategy(
            ParsingErrorCategory::SchemaValidation,
            RecoveryStrategy::new(
                "reinterpret",
                Backoff::HistoryAware {
                    base_ms: config.recovery.base_delay_ms,
                    max_ms: config.recovery.max_delay_ms,
                },
                Arc::new(RetryRequest),
            ),
        );
        recovery.register_strategy(
            ParsingErrorCategory::ContextMismatch,
            RecoveryStrategy::new("refresh_context", Backoff::None, Arc::new(RetryRequest)),
        );

        TaskParser {
            oracle: self.oracle,
            context_provider: self.context_provider,
            schema: self.schema,
            detector,
            disambiguator,
            confirmation,
            fallback,
            resolver,
            cache,
            errors: ParsingErrorHandler::new(),
            recovery,
            prompts,
            config,
        }
    }
}

pub struct TaskParser {
    oracle: Arc<dyn TextOracle>,
    context_provider: Arc<dyn ContextProvider>,
    schema: Arc<dyn SchemaValidator>,
    detector: Arc<AmbiguityDetector>,
    disambiguator: Arc<ContextDisambiguator>,
    confirmation: UserConfirmationHandler,
    fallback: Arc<TypeFallbackSystem>,
    resolver: TaskTypeResolver,
    cache: CommandCache,
    errors: ParsingErrorHandler,
    recovery: ErrorRecoveryManager,
    prompts: PromptBuilder,
    config: ParserConfig,
}

impl TaskParser {
    /// Parser with default config, system clock and built-in hierarchy
    pub fn new(oracle: Arc<dyn TextOracle>, context_provider: Arc<dyn ContextProvider>) -> Self {
        Self::builder(oracle, context_provider).build()
    }

    pub fn builder(oracle: Arc<dyn TextOracle>, context_provider: Arc<dyn ContextProvider>) -> TaskParserBuilder {
        TaskParserBuilder {
            oracle,
            context_provider,
            config: ParserConfig::default(),
            clock: Arc::new(SystemClock),
            schema: Arc::new(BasicSchemaValidator),
            hierarchy: TypeHierarchy::default_hierarchy(),
            patterns: None,
            base_handler: Arc::new(LoggingErrorHandler),
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn detector(&self) -> &AmbiguityDetector {
        &self.detector
    }

    pub fn cache(&self) -> &CommandCache {
        &self.cache
    }

    pub fn recovery(&self) -> &ErrorRecoveryManager {
        &self.recovery
    }

    pub fn error_handler(&self) -> &ParsingErrorHandler {
        &self.errors
    }

    pub fn pending_confirmation(&self, command: &str) -> Option<ConfirmationPrompt> {
        self.confirmation.pending(command)
    }

    /// Interpret a command for a player
    pub async fn parse(&self, command: &str, player: Option<&str>) -> Result<ParseOutcome, ParsingError> {
        let started = Instant::now();
        let error_context = ErrorContext::for_command(command, player);

        if command.trim().is_empty() {
            let err = self.errors.handle(
                PipelineError::InvalidCommand("command is empty".into()),
                error_context,
            );
            self.recovery.report_unrecovered(&err);
            return Err(err);
        }

        if let Some(task) = self.cache.get(command) {
            return Ok(ParseOutcome::Resolved(task));
        }

        let mut context = self.context_provider.snapshot(player);
        let mut strict = false;

        loop {
            match self.interpret(command, player, &context, strict).await {
                Ok(outcome) => {
                    if let ParseOutcome::Resolved(task) = &outcome {
                        self.cache.set(command, task.clone());
                    }
                    self.recovery.reset_all(&error_context.retry_key());
                    tracing::debug!(
                        command,
                        resolved = outcome.task().is_some(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "command parsed"
                    );
                    return Ok(outcome);
                }
                Err(e) => {
                    let mut err = self.errors.handle(e, error_context.clone());

                    if err.is_permanent() {
                        self.recovery.report_unrecovered(&err);
                        return Err(err);
                    }
                    if !self.recovery.attempt_recovery(&mut err).await {
                        return Err(err);
                    }

                    match err.category {
                        ParsingErrorCategory::ResponseParsing | ParsingErrorCategory::SchemaValidation => {
                            strict = true
                        }
                        ParsingErrorCategory::ContextMismatch => {
                            context = self.context_provider.snapshot(player)
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// `parse` for a command record received from the front end
    pub async fn parse_command(&self, command: &Command) -> Result<ParseOutcome, ParsingError> {
        tracing::trace!(command = %command.key(), received_at = command.timestamp, "command received");
        self.parse(&command.text, command.player.as_deref()).await
    }

    async fn interpret(
        &self,
        command: &str,
        player: Option<&str>,
        context: &TaskContext,
        strict: bool,
    ) -> Result<ParseOutcome, PipelineError> {
        let prompt = self.prompts.build(command, context, strict);
        let raw = match self.oracle.generate(&prompt).await {
            Ok(raw) if !raw.trim().is_empty() => raw,
            Ok(_) | Err(OracleError::EmptyResponse) => {
                return Err(PipelineError::ResponseFormat("oracle returned an empty response".into()))
            }
            Err(e) => return Err(e.into()),
        };

        let parsed = parse_response(&raw)?;
        let mut draft = draft_from_response(parsed, command, player);
        enrich_parameters(command, &mut draft.parameters);

        let ambiguity = self.detector.detect_ambiguity(command, context);
        draft.pattern_votes = ambiguity.pattern_votes();
        tracing::debug!(
            command,
            ambiguous = ambiguity.is_ambiguous,
            candidates = ambiguity.scores.len(),
            declared = %draft.declared_type,
            "ambiguity checked"
        );

        if let Some(mut result) = self.disambiguator.disambiguate(command, context, &ambiguity) {
            let oracle_agrees = draft.declared() == Some(result.resolved_type);
            if oracle_agrees {
                result.confidence = corroborate(
                    result.confidence,
                    draft.confidence,
                    self.config.resolution.corroboration_weight,
                );
            }

            if ambiguity.is_ambiguous {
                match self.confirmation.handle_ambiguous_command(
                    command,
                    player,
                    context,
                    &result,
                    Some(draft.clone()),
                ) {
                    ConfirmationDecision::Prompt(prompt) => {
                        return Ok(ParseOutcome::AwaitingConfirmation(prompt))
                    }
                    ConfirmationDecision::Resolved { task_type, confidence } => {
                        if draft.declared() != Some(task_type) {
                            draft.sub_type = None;
                        }
                        draft = draft.with_type(task_type).with_confidence(confidence);
                    }
                }
            } else if oracle_agrees {
                draft.confidence = result.confidence;
            }
        }

        let task = self.resolver.resolve(draft, context)?;
        self.schema.validate(&task).map_err(PipelineError::Schema)?;
        Ok(ParseOutcome::Resolved(task))
    }

    /// Complete a pending confirmation with the user's choice
    ///
    /// Returns `Ok(None)` when there was nothing to confirm, the prompt had
    /// expired or the type was not offered.
    pub async fn confirm(
        &self,
        command: &str,
        player: Option<&str>,
        selected: TaskType,
    ) -> Result<Option<Task>, ParsingError> {
        let context = self.context_provider.snapshot(player);
        let Some(prompt) = self.confirmation.confirm(command, selected, &context) else {
            return Ok(None);
        };

        let origin = TaskOrigin {
            command: prompt.command.clone(),
            player: prompt.player.clone().or_else(|| player.map(str::to_string)),
        };
        let mut draft = prompt
            .draft
            .clone()
            .unwrap_or_else(|| TaskDraft::new(selected.as_str(), origin));

        for (pattern_id, voted) in &draft.pattern_votes {
            self.detector
                .update_historical_success(pattern_id, *voted == selected);
        }

        if draft.declared() != Some(selected) {
            draft.sub_type = None;
        }
        draft = draft.with_type(selected).with_confidence(1.0);
        draft.locked = true;

        let resolved = self
            .resolver
            .resolve(draft, &context)
            .and_then(|task| {
                self.schema
                    .validate(&task)
                    .map_err(PipelineError::Schema)
                    .map(|_| task)
            });

        match resolved {
            Ok(task) => {
                self.cache.set(command, task.clone());
                Ok(Some(task))
            }
            Err(e) => {
                let err = self
                    .errors
                    .handle(e, ErrorContext::for_command(command, player));
                self.recovery.report_unrecovered(&err);
                Err(err)
            }
        }
    }

    pub async fn process_confirmation(&self, command: &str, player: Option<&str>, selected: TaskType) -> bool {
        matches!(self.confirm(command, player, selected).await, Ok(Some(_)))
    }

    /// Feed back how execution of a task went
    ///
    /// This and explicit confirmation are the only paths that update learned
    /// success rates. A failed task is dropped from the cache.
    pub fn record_execution_outcome(&self, task: &Task, success: bool) {
        for (pattern_id, voted) in &task.pattern_votes {
            if *voted == task.task_type {
                self.detector.update_historical_success(pattern_id, success);
            } else if success {
                self.detector.update_historical_success(pattern_id, false);
            }
        }
        self.fallback.record_outcome(task.task_type, success);
        self.disambiguator.add_historical_pattern(
            &task.origin.command,
            task.task_type,
            success,
            BTreeMap::new(),
        );
        if !success {
            self.cache.invalidate(&task.origin.command);
        }
        tracing::info!(
            command = %normalize_command(&task.origin.command),
            task_type = %task.task_type,
            success,
            "execution outcome recorded"
        );
    }

    pub fn stats(&self) -> ParserStats {
        ParserStats {
            cache: self.cache.stats(),
            pending_confirmations: self.confirmation.pending_count(),
            historical_patterns: self.disambiguator.history().len(),
        }
    }
}

fn draft_from_response(parsed: ParsedResponse, command: &str, player: Option<&str>) -> TaskDraft {
    let mut draft = TaskDraft::new(
        parsed.task_type,
        TaskOrigin {
            command: command.trim().to_string(),
            player: player.map(str::to_string),
        },
    )
    .with_description(parsed.description)
    .with_confidence(parsed.confidence);
    draft.sub_type = parsed.sub_type;
    draft.parameters = parsed.parameters;
    draft.priority = parsed.priority;
    draft
}
