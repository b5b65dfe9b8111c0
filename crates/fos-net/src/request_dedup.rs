//! Request Deduplication
//!
//! Track in-flight requests by resource locator so concurrent requests
//! for the same resource share a single fetch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeduplicationStats {
    pub total_requests: u64,
    pub deduplicated: u64,
    pub unique: u64,
}

impl DeduplicationStats {
    pub fn dedup_rate(&self) -> f64 {
        if self.total_requests == 0 { 0.0 }
        else { self.deduplicated as f64 / self.total_requests as f64 }
    }
}

#[derive(Debug)]
struct InFlight<V> {
    handle: V,
    subscriber_count: usize,
    started_at: Instant,
}

/// In-flight request table keyed by locator.
///
/// `V` is whatever handle waiters attach to (usually a shared future).
#[derive(Debug)]
pub struct InFlightTable<V> {
    pending: HashMap<String, InFlight<V>>,
    stats: DeduplicationStats,
}

impl<V> Default for InFlightTable<V> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            stats: DeduplicationStats::default(),
        }
    }
}

impl<V: Clone> InFlightTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to an existing request, if one is in flight
    pub fn join(&mut self, key: &str) -> Option<V> {
        let state = self.pending.get_mut(key)?;
        state.subscriber_count += 1;
        self.stats.total_requests += 1;
        self.stats.deduplicated += 1;
        Some(state.handle.clone())
    }

    /// Record a freshly started request
    pub fn start(&mut self, key: &str, handle: V) {
        self.stats.total_requests += 1;
        self.stats.unique += 1;
        self.pending.insert(key.to_string(), InFlight {
            handle,
            subscriber_count: 1,
            started_at: Instant::now(),
        });
    }

    /// Check if request is in flight
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    /// Drop the record, returning how many callers were attached
    pub fn complete(&mut self, key: &str) -> usize {
        self.pending.remove(key)
            .map(|state| state.subscriber_count)
            .unwrap_or(0)
    }

    /// How long a request has been in flight
    pub fn elapsed(&self, key: &str) -> Option<Duration> {
        self.pending.get(key).map(|state| state.started_at.elapsed())
    }

    /// Pending request count
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> DeduplicationStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_same_locator() {
        let mut table = InFlightTable::new();

        assert!(table.join("/assets/js/1.js").is_none());
        table.start("/assets/js/1.js", 7u32);
        assert_eq!(table.join("/assets/js/1.js"), Some(7));
        assert_eq!(table.join("/assets/js/1.js"), Some(7));

        assert!(table.is_pending("/assets/js/1.js"));
        assert_eq!(table.complete("/assets/js/1.js"), 3);
        assert!(!table.is_pending("/assets/js/1.js"));

        let stats = table.stats();
        assert_eq!(stats.unique, 1);
        assert_eq!(stats.deduplicated, 2);
        assert_eq!(stats.total_requests, 3);
    }

    #[test]
    fn test_different_locators() {
        let mut table = InFlightTable::new();

        table.start("/a.js", ());
        table.start("/b.js", ());

        assert_eq!(table.pending_count(), 2);
        assert!(table.elapsed("/a.js").is_some());
        assert!(table.elapsed("/c.js").is_none());
    }

    #[test]
    fn test_complete_unknown() {
        let mut table: InFlightTable<()> = InFlightTable::new();
        assert_eq!(table.complete("/nope.js"), 0);
        assert_eq!(table.stats().dedup_rate(), 0.0);
    }
}
