//! Import statistics.
//!
//! Counters are lock-free atomics so the message path never contends with
//! the stats endpoint.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Collects import counters.
#[derive(Debug)]
pub struct ImportStatistics {
    /// Messages handed to the engine.
    received: AtomicU64,

    /// Deltas accepted by the sink.
    delivered: AtomicU64,

    /// Messages that matched no rule, were excluded, duplicated or failed.
    dropped: AtomicU64,

    /// Active subscription filters.
    topics_subscribed: AtomicUsize,

    /// Last message arrival, milliseconds since the epoch (0 = never).
    last_message_ms: AtomicI64,
}

impl Default for ImportStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportStatistics {
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            topics_subscribed: AtomicUsize::new(0),
            last_message_ms: AtomicI64::new(0),
        }
    }

    /// Record an inbound message.
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        self.last_message_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_topics_subscribed(&self, count: usize) {
        self.topics_subscribed.store(count, Ordering::Relaxed);
    }

    /// Get current statistics snapshot.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let last_ms = self.last_message_ms.load(Ordering::Relaxed);
        StatisticsSnapshot {
            total_received: self.received.load(Ordering::Relaxed),
            messages_delivered: self.delivered.load(Ordering::Relaxed),
            messages_dropped: self.dropped.load(Ordering::Relaxed),
            topics_subscribed: self.topics_subscribed.load(Ordering::Relaxed),
            last_message_time: (last_ms > 0)
                .then(|| DateTime::<Utc>::from_timestamp_millis(last_ms))
                .flatten(),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsSnapshot {
    pub total_received: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub topics_subscribed: usize,
    pub last_message_time: Option<DateTime<Utc>>,
}
