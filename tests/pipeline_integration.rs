//! End-to-end scenarios for the command parsing pipeline

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use command_resolver::command::{OptionSource, ParseOutcome, TaskParser};
use command_resolver::core::config::ParserConfig;
use command_resolver::core::types::{ManualClock, MILLIS_PER_SECOND};
use command_resolver::llm::{LlmClient, OracleError, OraclePrompt, TextOracle};
use command_resolver::recovery::{ParsingErrorCategory, Severity};
use command_resolver::task::{StaticContextProvider, TaskContext, TaskType};

/// Answers every prompt with a fixed reply and counts calls
struct FixedOracle {
    reply: Result<String, OracleError>,
    calls: AtomicUsize,
}

impl FixedOracle {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(error: OracleError) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(error),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextOracle for FixedOracle {
    async fn generate(&self, _prompt: &OraclePrompt) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }

    async fn check_availability(&self) -> Result<(), OracleError> {
        match &self.reply {
            Err(e) if e.is_unavailable() => Err(e.clone()),
            _ => Ok(()),
        }
    }
}

const NAVIGATE_COORDS: &str = r#"Here you go:
{"task_type": "navigation", "sub_type": "coordinates", "description": "walk to 100 64 -200",
 "parameters": {"coordinates": {"x": 100, "y": 64, "z": -200}}, "priority": "normal", "confidence": 0.95}"#;

const NAVIGATE_VILLAGE: &str = r#"{"task_type": "navigation", "sub_type": "landmark", "description": "walk to the village",
 "parameters": {"destination": "village"}, "confidence": 0.7}"#;

fn fast_config() -> ParserConfig {
    let mut config = ParserConfig::default();
    config.recovery.base_delay_ms = 0;
    config.recovery.max_delay_ms = 0;
    config
}

fn build(oracle: Arc<dyn TextOracle>, context: TaskContext, clock: Arc<ManualClock>) -> TaskParser {
    TaskParser::builder(oracle, Arc::new(StaticContextProvider::new(context)))
        .config(fast_config())
        .clock(clock)
        .build()
}

#[tokio::test]
async fn test_coordinates_resolve_without_confirmation() {
    let oracle = FixedOracle::replying(NAVIGATE_COORDS);
    let clock = Arc::new(ManualClock::new(1_000));
    let parser = build(oracle.clone(), TaskContext::new().with_path(true, true), clock);

    let outcome = parser.parse("go to 100 64 -200", Some("alex")).await.unwrap();
    let task = match outcome {
        ParseOutcome::Resolved(task) => task,
        ParseOutcome::AwaitingConfirmation(p) => panic!("unexpected prompt: {}", p.render()),
    };

    assert_eq!(task.task_type, TaskType::Navigation);
    assert!(task.confidence >= 0.9, "confidence {}", task.confidence);
    assert_eq!(task.sub_type.as_deref(), Some("coordinates"));
    assert_eq!(task.origin.player.as_deref(), Some("alex"));
    assert_eq!(parser.stats().pending_confirmations, 0);
}

#[tokio::test]
async fn test_coordinates_filled_in_when_oracle_omits_them() {
    let oracle = FixedOracle::replying(
        r#"{"task_type": "navigation", "description": "walk there", "parameters": {}, "confidence": 0.9}"#,
    );
    let parser = build(
        oracle,
        TaskContext::new().with_path(true, true),
        Arc::new(ManualClock::new(0)),
    );
    let outcome = parser.parse("go to 10 70 -5", None).await.unwrap();
    let task = outcome.task().unwrap();
    assert_eq!(task.parameters["coordinates"]["z"], -5);
}

#[tokio::test]
async fn test_landmark_without_context_asks_for_confirmation() {
    let oracle = FixedOracle::replying(NAVIGATE_VILLAGE);
    let parser = build(oracle.clone(), TaskContext::new(), Arc::new(ManualClock::new(1_000)));

    let outcome = parser.parse("go to village", Some("alex")).await.unwrap();
    let prompt = outcome.prompt().expect("ambiguous command should prompt");

    assert!(!prompt.options.is_empty());
    assert!(prompt
        .options
        .windows(2)
        .all(|w| w[0].confidence >= w[1].confidence));
    assert_eq!(prompt.options[0].source, OptionSource::Resolved);
    assert!(prompt.offers(TaskType::Navigation));
    assert!(parser.cache().is_empty());
    assert_eq!(parser.stats().pending_confirmations, 1);
}

#[tokio::test]
async fn test_confirmation_completes_and_caches_task() {
    let oracle = FixedOracle::replying(NAVIGATE_VILLAGE);
    let parser = build(oracle.clone(), TaskContext::new(), Arc::new(ManualClock::new(1_000)));

    parser.parse("go to village", Some("alex")).await.unwrap();
    let task = parser
        .confirm("go to village", Some("alex"), TaskType::Navigation)
        .await
        .unwrap()
        .expect("offered type should be accepted");

    assert_eq!(task.task_type, TaskType::Navigation);
    assert_eq!(task.parameters["destination"], "village");
    assert_eq!(parser.stats().historical_patterns, 1);
    assert_eq!(parser.stats().pending_confirmations, 0);

    // Served from the cache from now on
    let again = parser.parse("go to village", Some("alex")).await.unwrap();
    assert_eq!(again.task().map(|t| t.id), Some(task.id));
    assert_eq!(oracle.calls(), 1);
}

#[tokio::test]
async fn test_confirmation_after_expiry_is_ignored() {
    let oracle = FixedOracle::replying(NAVIGATE_VILLAGE);
    let clock = Arc::new(ManualClock::new(1_000));
    let parser = build(oracle, TaskContext::new(), clock.clone());

    parser.parse("go to village", None).await.unwrap();
    clock.advance(31 * MILLIS_PER_SECOND);

    let confirmed = parser
        .confirm("go to village", None, TaskType::Navigation)
        .await
        .unwrap();
    assert!(confirmed.is_none());
    assert_eq!(parser.stats().historical_patterns, 0);
}

#[tokio::test]
async fn test_repeated_command_within_ttl_calls_oracle_once() {
    let oracle = FixedOracle::replying(NAVIGATE_COORDS);
    let clock = Arc::new(ManualClock::new(0));
    let parser = build(oracle.clone(), TaskContext::new().with_path(true, true), clock.clone());

    for _ in 0..3 {
        parser.parse("go to 100 64 -200", None).await.unwrap();
        clock.advance(MILLIS_PER_SECOND);
    }
    assert_eq!(oracle.calls(), 1);

    // Past the five minute TTL the oracle is asked again
    clock.advance(5 * 60 * MILLIS_PER_SECOND);
    parser.parse("go to 100 64 -200", None).await.unwrap();
    assert_eq!(oracle.calls(), 2);
    assert_eq!(parser.stats().cache.evictions, 1);
}

#[tokio::test]
async fn test_unreachable_oracle_is_critical_and_uncached() {
    command_resolver::core::logging::init_tracing("warn");
    let oracle = FixedOracle::failing(OracleError::Unavailable("connection refused".into()));
    let parser = build(oracle.clone(), TaskContext::new(), Arc::new(ManualClock::new(0)));

    let err = parser.parse("go to 100 64 -200", None).await.unwrap_err();
    assert_eq!(err.category, ParsingErrorCategory::ServiceError);
    assert_eq!(err.severity, Severity::Critical);
    assert_eq!(oracle.calls(), 1);
    assert!(parser.cache().is_empty());

    let friendly = parser.error_handler().user_friendly_message(&err);
    assert!(friendly.contains("go to 100 64 -200"));
}

#[tokio::test]
async fn test_unreachable_http_endpoint_is_critical() {
    // Nothing listens on the discard port locally
    let client = LlmClient::new("key".into(), "http://127.0.0.1:9/v1/chat/completions".into(), "m".into());
    let parser = build(Arc::new(client), TaskContext::new(), Arc::new(ManualClock::new(0)));

    let err = parser.parse("mine some iron", None).await.unwrap_err();
    assert_eq!(err.category, ParsingErrorCategory::ServiceError);
    assert_eq!(err.severity, Severity::Critical);
    assert!(parser.cache().is_empty());
}

#[tokio::test]
async fn test_rate_limited_oracle_gives_up_after_retry_cap() {
    let oracle = FixedOracle::failing(OracleError::RateLimited);
    let parser = build(oracle.clone(), TaskContext::new(), Arc::new(ManualClock::new(0)));

    let err = parser.parse("mine some iron", None).await.unwrap_err();
    assert_eq!(err.category, ParsingErrorCategory::ServiceError);
    // initial call plus three retries
    assert_eq!(oracle.calls(), 4);
    assert_eq!(
        parser
            .recovery()
            .retry_count(ParsingErrorCategory::ServiceError, "mine some iron"),
        3
    );
}

#[tokio::test]
async fn test_concurrent_parses_share_one_cache() {
    let oracle = FixedOracle::replying(NAVIGATE_COORDS);
    let parser = build(
        oracle.clone(),
        TaskContext::new().with_path(true, true),
        Arc::new(ManualClock::new(0)),
    );

    let (a, b, c) = tokio::join!(
        parser.parse("go to 100 64 -200", None),
        parser.parse("walk to 1 2 3", None),
        parser.parse("head to 4 5 6", None),
    );
    for outcome in [a, b, c] {
        assert!(outcome.unwrap().task().is_some());
    }
    assert_eq!(parser.cache().len(), 3);
    assert_eq!(oracle.calls(), 3);
}

#[tokio::test]
async fn test_toml_config_changes_margin() {
    let mut config = ParserConfig::from_toml_str("[ambiguity]\nmargin = 0.0\n").unwrap();
    config.recovery.base_delay_ms = 0;
    let parser = TaskParser::builder(
        FixedOracle::replying(NAVIGATE_VILLAGE),
        Arc::new(StaticContextProvider::new(TaskContext::new())),
    )
    .config(config)
    .clock(Arc::new(ManualClock::new(0)))
    .build();

    // With no margin nothing is ambiguous, so no prompt is raised
    let outcome = parser.parse("go to village", None).await.unwrap();
    assert!(outcome.task().is_some());
}
