//! Resolved-command cache
//!
//! Keys are normalized command text. Entries expire `ttl_ms` after they were
//! written; expired entries are dropped lazily on lookup or by
//! `purge_expired`. At capacity the least recently accessed entry goes first.

use crate::core::config::CacheConfig;
use crate::core::types::{normalize_command, Clock, Timestamp};
use crate::task::types::Task;
use ahash::AHashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub task: Task,
    pub created_at: Timestamp,
    pub last_accessed_at: Timestamp,
    pub hit_count: u32,
    /// Monotonic access order; breaks ties between equal timestamps
    access_seq: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub sets: u64,
    pub total_requests: u64,
    pub size: usize,
    pub capacity: usize,
    pub hit_rate: f64,
    /// Running mean time to serve a hit, in microseconds
    pub avg_response_time_us: f64,
}

#[derive(Default)]
struct CacheInner {
    entries: AHashMap<String, CacheEntry>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    sets: u64,
    total_requests: u64,
    avg_response_time_us: f64,
}

impl CacheInner {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn evict_lru(&mut self) -> Option<String> {
        let key = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.access_seq)
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&key);
        self.evictions += 1;
        Some(key)
    }
}

pub struct CommandCache {
    inner: Mutex<CacheInner>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl CommandCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            config,
            clock,
        }
    }

    fn is_expired(&self, entry: &CacheEntry, now: Timestamp) -> bool {
        now.saturating_sub(entry.created_at) >= self.config.ttl_ms
    }

    /// Cached task for a command, if present and within its TTL
    pub fn get(&self, command: &str) -> Option<Task> {
        let started = Instant::now();
        let key = normalize_command(command);
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.total_requests += 1;

        match inner.entries.get(&key).map(|e| self.is_expired(e, now)) {
            None => {
                inner.misses += 1;
                tracing::debug!(command = %key, "cache miss");
                return None;
            }
            Some(true) => {
                inner.entries.remove(&key);
                inner.evictions += 1;
                inner.misses += 1;
                tracing::debug!(command = %key, "cache entry expired");
                return None;
            }
            Some(false) => {}
        }

        let seq = inner.seq();
        let task = {
            let entry = inner.entries.get_mut(&key)?;
            entry.last_accessed_at = now;
            entry.hit_count += 1;
            entry.access_seq = seq;
            entry.task.clone()
        };
        inner.hits += 1;

        let elapsed = started.elapsed().as_secs_f64() * 1_000_000.0;
        let hits = inner.hits as f64;
        inner.avg_response_time_us += (elapsed - inner.avg_response_time_us) / hits;

        tracing::debug!(command = %key, task_type = %task.task_type, "cache hit");
        Some(task)
    }

    /// Store a resolved task, evicting the least recently accessed entry when full
    pub fn set(&self, command: &str, task: Task) {
        let key = normalize_command(command);
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if !inner.entries.contains_key(&key) {
            while inner.entries.len() >= self.config.capacity.max(1) {
                match inner.evict_lru() {
                    Some(evicted) => tracing::debug!(command = %evicted, "cache entry evicted"),
                    None => break,
                }
            }
        }

        let seq = inner.seq();
        inner.entries.insert(
            key,
            CacheEntry {
                task,
                created_at: now,
                last_accessed_at: now,
                hit_count: 0,
                access_seq: seq,
            },
        );
        inner.sets += 1;
    }

    /// Drop one command; returns whether it was cached
    pub fn invalidate(&self, command: &str) -> bool {
        self.inner
            .lock()
            .entries
            .remove(&normalize_command(command))
            .is_some()
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Remove every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| now.saturating_sub(e.created_at) < self.config.ttl_ms);
        let removed = before - inner.entries.len();
        inner.evictions += removed as u64;
        removed
    }

    /// Entry metadata without touching access order or counters
    pub fn peek(&self, command: &str) -> Option<CacheEntry> {
        self.inner.lock().entries.get(&normalize_command(command)).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            sets: inner.sets,
            total_requests: inner.total_requests,
            size: inner.entries.len(),
            capacity: self.config.capacity,
            hit_rate: if inner.total_requests == 0 {
                0.0
            } else {
                inner.hits as f64 / inner.total_requests as f64
            },
            avg_response_time_us: inner.avg_response_time_us,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ManualClock;
    use crate::task::types::{TaskDraft, TaskOrigin, TaskType};

    fn task(command: &str) -> Task {
        let draft = TaskDraft::new(
            "query",
            TaskOrigin {
                command: command.into(),
                player: None,
            },
        );
        Task::from_draft(draft, TaskType::Query, 0)
    }

    fn cache(capacity: usize) -> (CommandCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let config = CacheConfig {
            ttl_ms: 1_000,
            capacity,
        };
        (CommandCache::new(config, clock.clone()), clock)
    }

    #[test]
    fn test_set_then_get_returns_same_task() {
        let (c, _) = cache(4);
        let t = task("status");
        c.set("status", t.clone());
        assert_eq!(c.get("  STATUS "), Some(t));
        let stats = c.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.hit_rate, 1.0);
        assert_eq!(c.peek("status").unwrap().hit_count, 1);
    }

    #[test]
    fn test_expired_entry_counts_as_eviction_and_miss() {
        let (c, clock) = cache(4);
        c.set("status", task("status"));
        clock.advance(999);
        assert!(c.get("status").is_some());
        clock.advance(1);
        assert!(c.get("status").is_none());
        let stats = c.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_overflow_evicts_least_recently_accessed() {
        let (c, _) = cache(2);
        c.set("a", task("a"));
        c.set("b", task("b"));
        assert!(c.get("a").is_some());
        c.set("c", task("c"));
        assert!(c.peek("a").is_some());
        assert!(c.peek("b").is_none());
        assert!(c.peek("c").is_some());
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let (c, _) = cache(2);
        c.set("a", task("a"));
        c.set("b", task("b"));
        c.set("a", task("a"));
        assert_eq!(c.len(), 2);
        assert_eq!(c.stats().evictions, 0);
    }

    #[test]
    fn test_maintenance_operations() {
        let (c, clock) = cache(8);
        c.set("a", task("a"));
        clock.advance(600);
        c.set("b", task("b"));
        clock.advance(600);
        assert_eq!(c.purge_expired(), 1);
        assert!(c.invalidate("b"));
        assert!(!c.invalidate("b"));
        c.set("c", task("c"));
        c.clear();
        assert!(c.is_empty());
    }
}
