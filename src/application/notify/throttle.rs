//! Per-owner email throttle with fixed one-hour windows and a bounded
//! digest queue for everything over the limit.

use crate::domain::notify::Priority;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

const WINDOW_MINUTES: i64 = 60;
const DIGEST_CAP: usize = 50;

#[derive(Debug, Clone)]
pub struct DigestEntry {
    pub event: String,
    pub data: Value,
    pub priority: Priority,
    pub queued_at: DateTime<Utc>,
}

#[derive(Debug)]
struct ThrottleBucket {
    count: u32,
    window_start: DateTime<Utc>,
    queued: Vec<DigestEntry>,
}

impl ThrottleBucket {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
            queued: Vec::new(),
        }
    }

    /// Windows are fixed one-hour spans from `window_start`; rolling over
    /// resets the counter but keeps the digest queue.
    fn roll(&mut self, now: DateTime<Utc>) {
        if now - self.window_start > Duration::minutes(WINDOW_MINUTES) {
            self.count = 0;
            self.window_start = now;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Send,
    Digest,
}

/// In-memory throttle state, one bucket per owner. Single-writer: only the
/// dispatcher touches it.
#[derive(Default)]
pub struct ThrottleRegistry {
    buckets: HashMap<String, ThrottleBucket>,
}

impl ThrottleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decide(
        &mut self,
        owner: &str,
        priority: Priority,
        max_per_hour: u32,
        now: DateTime<Utc>,
    ) -> ThrottleDecision {
        let Some(multiplier) = priority.throttle_multiplier() else {
            // Critical bypasses the throttle entirely.
            return ThrottleDecision::Send;
        };
        if multiplier == 0 {
            return ThrottleDecision::Digest;
        }

        let bucket = self
            .buckets
            .entry(owner.to_string())
            .or_insert_with(|| ThrottleBucket::new(now));
        bucket.roll(now);

        let limit = max_per_hour.saturating_mul(multiplier);
        if bucket.count < limit {
            ThrottleDecision::Send
        } else {
            ThrottleDecision::Digest
        }
    }

    pub fn record_send(&mut self, owner: &str, now: DateTime<Utc>) {
        let bucket = self
            .buckets
            .entry(owner.to_string())
            .or_insert_with(|| ThrottleBucket::new(now));
        bucket.roll(now);
        bucket.count += 1;
    }

    /// Append to the owner's digest queue; entries past the cap are dropped.
    /// Returns whether the entry was kept.
    pub fn queue_digest(&mut self, owner: &str, entry: DigestEntry, now: DateTime<Utc>) -> bool {
        let bucket = self
            .buckets
            .entry(owner.to_string())
            .or_insert_with(|| ThrottleBucket::new(now));
        if bucket.queued.len() >= DIGEST_CAP {
            warn!("Throttle: digest queue full for {}, dropping {}", owner, entry.event);
            return false;
        }
        bucket.queued.push(entry);
        true
    }

    /// Drain and return the owner's digest queue.
    pub fn flush_digest_queue(&mut self, owner: &str) -> Vec<DigestEntry> {
        self.buckets
            .get_mut(owner)
            .map(|bucket| std::mem::take(&mut bucket.queued))
            .unwrap_or_default()
    }

    pub fn digest_len(&self, owner: &str) -> usize {
        self.buckets.get(owner).map(|b| b.queued.len()).unwrap_or(0)
    }

    pub fn sent_in_window(&self, owner: &str) -> u32 {
        self.buckets.get(owner).map(|b| b.count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(event: &str) -> DigestEntry {
        DigestEntry {
            event: event.to_string(),
            data: json!({}),
            priority: Priority::Medium,
            queued_at: Utc::now(),
        }
    }

    #[test]
    fn test_medium_respects_max_per_hour() {
        let mut reg = ThrottleRegistry::new();
        let now = Utc::now();
        for _ in 0..3 {
            assert_eq!(
                reg.decide("a@b.c", Priority::Medium, 3, now),
                ThrottleDecision::Send
            );
            reg.record_send("a@b.c", now);
        }
        assert_eq!(
            reg.decide("a@b.c", Priority::Medium, 3, now),
            ThrottleDecision::Digest
        );
    }

    #[test]
    fn test_high_gets_triple_budget() {
        let mut reg = ThrottleRegistry::new();
        let now = Utc::now();
        for _ in 0..6 {
            assert_eq!(
                reg.decide("a@b.c", Priority::High, 2, now),
                ThrottleDecision::Send
            );
            reg.record_send("a@b.c", now);
        }
        assert_eq!(
            reg.decide("a@b.c", Priority::High, 2, now),
            ThrottleDecision::Digest
        );
    }

    #[test]
    fn test_critical_bypasses_and_low_digests() {
        let mut reg = ThrottleRegistry::new();
        let now = Utc::now();
        for _ in 0..100 {
            reg.record_send("a@b.c", now);
        }
        assert_eq!(
            reg.decide("a@b.c", Priority::Critical, 1, now),
            ThrottleDecision::Send
        );
        assert_eq!(
            reg.decide("a@b.c", Priority::Low, 1, now),
            ThrottleDecision::Digest
        );
    }

    #[test]
    fn test_window_rolls_after_an_hour() {
        let mut reg = ThrottleRegistry::new();
        let now = Utc::now();
        reg.record_send("a@b.c", now);
        assert_eq!(
            reg.decide("a@b.c", Priority::Medium, 1, now),
            ThrottleDecision::Digest
        );
        let later = now + Duration::minutes(61);
        assert_eq!(
            reg.decide("a@b.c", Priority::Medium, 1, later),
            ThrottleDecision::Send
        );
        assert_eq!(reg.sent_in_window("a@b.c"), 0);
    }

    #[test]
    fn test_digest_cap_and_flush() {
        let mut reg = ThrottleRegistry::new();
        let now = Utc::now();
        for i in 0..60 {
            reg.queue_digest("a@b.c", entry(&format!("e{}", i)), now);
        }
        assert_eq!(reg.digest_len("a@b.c"), 50);

        let flushed = reg.flush_digest_queue("a@b.c");
        assert_eq!(flushed.len(), 50);
        assert_eq!(reg.digest_len("a@b.c"), 0);
        assert!(reg.flush_digest_queue("a@b.c").is_empty());
    }
}
