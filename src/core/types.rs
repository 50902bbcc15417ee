//! Core type definitions used throughout the codebase

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time in milliseconds since the Unix epoch
pub type Timestamp = u64;

pub const MILLIS_PER_SECOND: u64 = 1_000;
pub const MILLIS_PER_HOUR: u64 = 3_600_000;

/// Source of the current time for every time-dependent store
///
/// TTLs, confirmation expiry and historical decay all read an injected clock
/// so tests can drive time explicitly.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Clamp a score into [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Lowercase, trim and collapse whitespace so equivalent commands share a key
pub fn normalize_command(text: &str) -> String {
    text.split_whitespace()
        .map(|t| t.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-overlap similarity between two commands (Jaccard over lowercase words)
pub fn token_similarity(a: &str, b: &str) -> f64 {
    use ahash::AHashSet;

    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let a_tokens: AHashSet<&str> = a_lower.split_whitespace().collect();
    let b_tokens: AHashSet<&str> = b_lower.split_whitespace().collect();

    if a_tokens.is_empty() && b_tokens.is_empty() {
        return 1.0;
    }
    let union = a_tokens.union(&b_tokens).count();
    if union == 0 {
        return 0.0;
    }
    a_tokens.intersection(&b_tokens).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(500);
        assert_eq!(clock.now(), 1_500);
        clock.set(10);
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert!((clamp_unit(0.42) - 0.42).abs() < f64::EPSILON);
    }

    #[test]
    fn test_normalize_command() {
        assert_eq!(normalize_command("  Go   TO village "), "go to village");
    }

    #[test]
    fn test_token_similarity() {
        assert!((token_similarity("go to village", "go to village") - 1.0).abs() < 1e-9);
        assert!((token_similarity("go to village", "go to the village") - 0.75).abs() < 1e-9);
        assert_eq!(token_similarity("mine iron", "plant wheat"), 0.0);
    }
}
