//! Duplicate suppression.
//!
//! Remembers every (topic, payload) pair seen on rules that ignore
//! duplicates. Memory is bounded: once the cache grows past
//! [`MAX_ENTRIES`], the [`EVICT_BATCH`] oldest insertions are dropped in one
//! go. Entries never expire on their own.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

/// Cache size above which a batch eviction runs.
pub const MAX_ENTRIES: usize = 1000;

/// Number of entries removed per eviction.
pub const EVICT_BATCH: usize = 500;

#[derive(Debug, Default)]
pub struct Deduplicator {
    /// Key to first-seen instant
    seen: HashMap<String, Instant>,
    /// Keys in insertion order
    order: VecDeque<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(topic: &str, payload: &str) -> String {
        format!("{topic}:{payload}")
    }

    /// Record the pair and report whether it was seen before.
    ///
    /// When `ignore_duplicates` is false nothing is recorded and the message
    /// is never suppressed.
    pub fn should_suppress(&mut self, topic: &str, payload: &str, ignore_duplicates: bool) -> bool {
        if !ignore_duplicates {
            return false;
        }

        let key = Self::key(topic, payload);
        if self.seen.contains_key(&key) {
            return true;
        }

        self.seen.insert(key.clone(), Instant::now());
        self.order.push_back(key);

        if self.seen.len() > MAX_ENTRIES {
            self.evict_oldest();
        }
        false
    }

    fn evict_oldest(&mut self) {
        for key in self.order.drain(..EVICT_BATCH.min(self.order.len())) {
            self.seen.remove(&key);
        }
    }

    /// When the pair was first seen, if it is still cached.
    pub fn first_seen(&self, topic: &str, payload: &str) -> Option<Instant> {
        self.seen.get(&Self::key(topic, payload)).copied()
    }

    /// Number of cached pairs.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_identical_message_suppressed() {
        let mut dedup = Deduplicator::new();
        assert!(!dedup.should_suppress("vessels/self/x", "1.5", true));
        assert!(dedup.should_suppress("vessels/self/x", "1.5", true));
        assert!(!dedup.should_suppress("vessels/self/x", "1.6", true));
        assert!(!dedup.should_suppress("vessels/self/y", "1.5", true));
        assert_eq!(dedup.len(), 3);
    }

    #[test]
    fn test_disabled_rule_touches_nothing() {
        let mut dedup = Deduplicator::new();
        assert!(!dedup.should_suppress("a", "1", false));
        assert!(!dedup.should_suppress("a", "1", false));
        assert!(dedup.is_empty());
    }

    #[test]
    fn test_first_seen_not_refreshed() {
        let mut dedup = Deduplicator::new();
        dedup.should_suppress("a", "1", true);
        let first = dedup.first_seen("a", "1").unwrap();
        dedup.should_suppress("a", "1", true);
        assert_eq!(dedup.first_seen("a", "1"), Some(first));
    }

    #[test]
    fn test_batch_eviction() {
        let mut dedup = Deduplicator::new();
        for i in 0..MAX_ENTRIES {
            dedup.should_suppress("t", &i.to_string(), true);
        }
        assert_eq!(dedup.len(), MAX_ENTRIES);

        dedup.should_suppress("t", "overflow", true);
        assert_eq!(dedup.len(), 501);

        // The oldest half is gone, the newest entries survive.
        assert!(dedup.first_seen("t", "0").is_none());
        assert!(dedup.first_seen("t", "499").is_none());
        assert!(dedup.first_seen("t", "500").is_some());
        assert!(dedup.first_seen("t", "overflow").is_some());
        assert!(!dedup.should_suppress("t", "0", true));
    }

    #[test]
    fn test_clear() {
        let mut dedup = Deduplicator::new();
        dedup.should_suppress("a", "1", true);
        dedup.clear();
        assert!(dedup.is_empty());
        assert!(!dedup.should_suppress("a", "1", true));
    }
}
