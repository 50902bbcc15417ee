//! Retry and recovery for classified parsing errors
//!
//! Each category has one retry policy (a cap on attempts per task) and an
//! ordered list of strategies. A strategy runs after its backoff delay; the
//! first one that reports success ends recovery.

use crate::core::config::RecoveryConfig;
use crate::recovery::handler::{BaseErrorHandler, LoggingErrorHandler, ParsingError};
use crate::recovery::taxonomy::ParsingErrorCategory;
use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// A remediation step; returns true when the failed step is worth retrying
#[async_trait]
pub trait RecoveryAction: Send + Sync {
    async fn execute(&self, error: &ParsingError) -> bool;
}

/// Asks the caller to repeat the failed step unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryRequest;

#[async_trait]
impl RecoveryAction for RetryRequest {
    async fn execute(&self, _error: &ParsingError) -> bool {
        true
    }
}

/// Delay before a strategy runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    None,
    Fixed { delay_ms: u64 },
    /// `base * 2^attempt`, capped
    Exponential { base_ms: u64, max_ms: u64 },
    /// Exponential, stretched by the category's recent failure ratio
    HistoryAware { base_ms: u64, max_ms: u64 },
}

impl Backoff {
    /// Delay for the given zero-based attempt
    pub fn delay(&self, attempt: u32, failure_ratio: f64) -> Duration {
        let exponential = |base: u64, max: u64| base.saturating_mul(1u64 << attempt.min(20)).min(max);
        let ms = match *self {
            Self::None => 0,
            Self::Fixed { delay_ms } => delay_ms,
            Self::Exponential { base_ms, max_ms } => exponential(base_ms, max_ms),
            Self::HistoryAware { base_ms, max_ms } => {
                let stretched = exponential(base_ms, max_ms) as f64 * (1.0 + failure_ratio.clamp(0.0, 1.0));
                (stretched as u64).min(max_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

#[derive(Clone)]
pub struct RecoveryStrategy {
    pub name: String,
    pub backoff: Backoff,
    action: Arc<dyn RecoveryAction>,
}

impl RecoveryStrategy {
    pub fn new(name: impl Into<String>, backoff: Backoff, action: Arc<dyn RecoveryAction>) -> Self {
        Self {
            name: name.into(),
            backoff,
            action,
        }
    }
}

impl std::fmt::Debug for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryStrategy")
            .field("name", &self.name)
            .field("backoff", &self.backoff)
            .finish()
    }
}

/// Retry cap and strategies for one category
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Attempts allowed per (category, task) before strategies are skipped
    pub max_retries: u32,
    /// Tried in order
    pub strategies: Vec<RecoveryStrategy>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Outcomes {
    attempts: u32,
    successes: u32,
}

impl Outcomes {
    fn failure_ratio(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            1.0 - self.successes as f64 / self.attempts as f64
        }
    }
}

pub struct ErrorRecoveryManager {
    policies: AHashMap<ParsingErrorCategory, RetryPolicy>,
    retry_counts: Mutex<AHashMap<(ParsingErrorCategory, String), u32>>,
    outcomes: Mutex<AHashMap<ParsingErrorCategory, Outcomes>>,
    base_handler: Arc<dyn BaseErrorHandler>,
}

impl ErrorRecoveryManager {
    /// Empty policies for every category; retry caps from `config`
    pub fn new(config: &RecoveryConfig, base_handler: Arc<dyn BaseErrorHandler>) -> Self {
        let policies = ParsingErrorCategory::ALL
            .iter()
            .map(|&category| {
                let max_retries = match category {
                    ParsingErrorCategory::ServiceError => config.service_max_retries,
                    ParsingErrorCategory::ResponseParsing => config.response_parsing_max_retries,
                    ParsingErrorCategory::SchemaValidation => config.schema_max_retries,
                    ParsingErrorCategory::ContextMismatch => config.context_max_retries,
                    _ => 0,
                };
                (
                    category,
                    RetryPolicy {
                        max_retries,
                        strategies: Vec::new(),
                    },
                )
            })
            .collect();

        Self {
            policies,
            retry_counts: Mutex::new(AHashMap::new()),
            outcomes: Mutex::new(AHashMap::new()),
            base_handler,
        }
    }

    /// Append a strategy to a category's list
    pub fn register_strategy(&mut self, category: ParsingErrorCategory, strategy: RecoveryStrategy) {
        self.policies.entry(category).or_default().strategies.push(strategy);
    }

    pub fn set_max_retries(&mut self, category: ParsingErrorCategory, max_retries: u32) {
        self.policies.entry(category).or_default().max_retries = max_retries;
    }

    pub fn policy(&self, category: ParsingErrorCategory) -> Option<&RetryPolicy> {
        self.policies.get(&category)
    }

    pub fn retry_count(&self, category: ParsingErrorCategory, key: &str) -> u32 {
        self.retry_counts
            .lock()
            .get(&(category, key.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Make a task eligible for recovery again
    pub fn reset_retry_count(&self, category: ParsingErrorCategory, key: &str) {
        self.retry_counts.lock().remove(&(category, key.to_string()));
    }

    /// Reset every category's counter for one task
    pub fn reset_all(&self, key: &str) {
        self.retry_counts.lock().retain(|(_, k), _| k != key);
    }

    /// Hand an error straight to the base handler, bypassing strategies
    pub fn report_unrecovered(&self, error: &ParsingError) {
        self.base_handler.handle(error);
    }

    /// Try the category's strategies in order
    ///
    /// Strategies are skipped once the (category, task) counter reaches the
    /// cap. Returns true on the first successful strategy; otherwise the error
    /// goes to the base handler and false is returned.
    pub async fn attempt_recovery(&self, error: &mut ParsingError) -> bool {
        let category = error.category;
        let key = error.context.retry_key();
        let Some(policy) = self.policies.get(&category) else {
            self.base_handler.handle(error);
            return false;
        };

        for strategy in &policy.strategies {
            let attempt = {
                let mut counts = self.retry_counts.lock();
                let count = counts.entry((category, key.clone())).or_insert(0);
                if *count >= policy.max_retries {
                    tracing::warn!(
                        %category,
                        strategy = %strategy.name,
                        retries = *count,
                        max = policy.max_retries,
                        "recovery strategy skipped: retry cap reached"
                    );
                    continue;
                }
                let attempt = *count;
                *count += 1;
                attempt
            };

            let failure_ratio = self
                .outcomes
                .lock()
                .get(&category)
                .map(Outcomes::failure_ratio)
                .unwrap_or(0.0);
            let delay = strategy.backoff.delay(attempt, failure_ratio);

            tracing::info!(
                %category,
                strategy = %strategy.name,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "attempting recovery"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            error.recovery_strategy = Some(strategy.name.clone());
            let recovered = strategy.action.execute(error).await;

            {
                let mut outcomes = self.outcomes.lock();
                let o = outcomes.entry(category).or_default();
                o.attempts += 1;
                if recovered {
                    o.successes += 1;
                }
            }

            if recovered {
                tracing::info!(%category, strategy = %strategy.name, "recovery succeeded");
                return true;
            }
        }

        self.base_handler.handle(error);
        false
    }
}

impl Default for ErrorRecoveryManager {
    fn default() -> Self {
        Self::new(&RecoveryConfig::default(), Arc::new(LoggingErrorHandler))
    }
}
