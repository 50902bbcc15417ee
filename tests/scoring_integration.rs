//! Property tests over scoring, history and cache bounds

use std::collections::BTreeMap;
use std::sync::Arc;

use command_resolver::ambiguity::AmbiguityDetector;
use command_resolver::command::{corroborate, CommandCache};
use command_resolver::core::config::{AmbiguityConfig, CacheConfig, HistoryConfig};
use command_resolver::core::types::{normalize_command, ManualClock};
use command_resolver::disambiguation::{HistoricalPattern, HistoricalPatternStore};
use command_resolver::task::{Task, TaskContext, TaskDraft, TaskOrigin, TaskType};
use proptest::prelude::*;

fn command_strategy() -> impl Strategy<Value = String> {
    let words = prop::sample::select(vec![
        "go", "to", "mine", "iron", "get", "wood", "village", "build", "a", "house", "attack",
        "the", "zombie", "craft", "sword", "harvest", "wheat", "what", "are", "you", "doing",
        "100", "64", "-200", "store", "cobblestone",
    ]);
    prop::collection::vec(words, 1..7).prop_map(|w| w.join(" "))
}

fn context_strategy() -> impl Strategy<Value = TaskContext> {
    (any::<bool>(), any::<bool>(), 0.0f32..20.0, any::<bool>()).prop_map(
        |(clear, reachable, health, pickaxe)| {
            let ctx = TaskContext::new()
                .with_path(clear, reachable)
                .with_vitals(health, 20.0);
            if pickaxe {
                ctx.with_item("iron_pickaxe", 1).with_block("iron_ore", 4.0)
            } else {
                ctx
            }
        },
    )
}

fn task_for(command: &str) -> Task {
    let origin = TaskOrigin {
        command: command.to_string(),
        player: None,
    };
    Task::from_draft(TaskDraft::new("query", origin), TaskType::Query, 0)
}

proptest! {
    #[test]
    fn test_scores_stay_in_unit_range(
        command in command_strategy(),
        ctx in context_strategy(),
        outcomes in prop::collection::vec((any::<prop::sample::Index>(), any::<bool>()), 0..30),
    ) {
        let detector = AmbiguityDetector::new(AmbiguityConfig::default());
        let ids: Vec<String> = detector.patterns().iter().map(|p| p.id.clone()).collect();
        for (index, success) in &outcomes {
            detector.update_historical_success(&ids[index.index(ids.len())], *success);
        }

        let result = detector.detect_ambiguity(&command, &ctx);
        for score in &result.scores {
            prop_assert!((0.0..=1.0).contains(&score.confidence));
            prop_assert!((0.0..=1.0).contains(&score.context_relevance));
            prop_assert!((0.0..=1.0).contains(&score.historical_success));
            prop_assert!((0.0..=1.0).contains(&score.total_score));
        }
        for id in &ids {
            prop_assert!((0.0..=1.0).contains(&detector.historical_success(id)));
        }
    }

    #[test]
    fn test_detection_is_deterministic(command in command_strategy(), ctx in context_strategy()) {
        let detector = AmbiguityDetector::new(AmbiguityConfig::default());
        prop_assert_eq!(
            detector.detect_ambiguity(&command, &ctx),
            detector.detect_ambiguity(&command, &ctx)
        );
    }

    #[test]
    fn test_ambiguous_iff_top_two_within_margin(
        command in command_strategy(),
        ctx in context_strategy(),
        margin in 0.0f64..0.5,
    ) {
        let config = AmbiguityConfig { margin, ..AmbiguityConfig::default() };
        let result = AmbiguityDetector::new(config).detect_ambiguity(&command, &ctx);
        let expected = result.scores.len() >= 2
            && result.scores[0].total_score - result.scores[1].total_score < margin;
        prop_assert_eq!(result.is_ambiguous, expected);
        prop_assert!(result
            .scores
            .windows(2)
            .all(|w| w[0].total_score >= w[1].total_score));
    }

    #[test]
    fn test_history_never_exceeds_capacity(cap in 1usize..20, adds in 0usize..60) {
        let store = HistoricalPatternStore::new(HistoryConfig {
            max_patterns: cap,
            ..HistoryConfig::default()
        });
        for i in 0..adds {
            store.add(HistoricalPattern {
                command: format!("mine block {}", i),
                resolved_type: TaskType::Mining,
                success: i % 2 == 0,
                timestamp: i as u64,
                context_factors: BTreeMap::new(),
            });
        }
        prop_assert_eq!(store.len(), adds.min(cap));
        // The newest pattern always survives eviction
        if adds > 0 {
            let expected = format!("mine block {}", adds - 1);
            prop_assert!(store.snapshot().iter().any(|p| p.command == expected));
        }
    }

    #[test]
    fn test_cache_never_exceeds_capacity(
        capacity in 1usize..10,
        commands in prop::collection::vec(command_strategy(), 0..40),
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let cache = CommandCache::new(
            CacheConfig { capacity, ..CacheConfig::default() },
            clock.clone(),
        );
        for command in &commands {
            cache.set(command, task_for(command));
            clock.advance(1);
            prop_assert!(cache.len() <= capacity);
        }
        if let Some(last) = commands.last() {
            prop_assert!(cache.get(last).is_some());
        }
    }

    #[test]
    fn test_corroboration_never_lowers_confidence(
        c in 0.0f64..=1.0,
        oracle in 0.0f64..=1.0,
        weight in 0.0f64..=1.0,
    ) {
        let boosted = corroborate(c, oracle, weight);
        prop_assert!(boosted >= c);
        prop_assert!(boosted <= 1.0);
    }

    #[test]
    fn test_normalization_is_idempotent(command in "[ A-Za-z0-9]{0,30}") {
        let once = normalize_command(&command);
        prop_assert_eq!(normalize_command(&once), once);
    }
}
