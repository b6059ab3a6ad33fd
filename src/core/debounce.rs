// LogMedic - core/debounce.rs
//
// Cool-down tracking for issue announcements.
//
// A record maps an issue id to the last time it was announced. A detection
// inside the window is suppressed. The map is bounded: once it grows past
// `max_entries`, records whose window has expired are evicted, and if that
// is not enough the oldest records go next.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Per-issue last-announced timestamps with a bounded footprint.
#[derive(Debug)]
pub struct DebounceTracker {
    window: Duration,
    max_entries: usize,
    last_reported: HashMap<String, DateTime<Utc>>,
}

impl DebounceTracker {
    pub fn new(window: Duration, max_entries: usize) -> Self {
        Self {
            window,
            max_entries: max_entries.max(1),
            last_reported: HashMap::new(),
        }
    }

    /// Returns `true` and records `now` when `id` may be announced; returns
    /// `false` (leaving the record untouched) when it was announced less than
    /// one window ago.
    pub fn check_and_record(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        if let Some(last) = self.last_reported.get(id) {
            if now.signed_duration_since(*last) < self.window {
                return false;
            }
        }
        self.last_reported.insert(id.to_string(), now);
        if self.last_reported.len() > self.max_entries {
            self.evict(now);
        }
        true
    }

    /// Number of remembered records.
    pub fn len(&self) -> usize {
        self.last_reported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_reported.is_empty()
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let window = self.window;
        let before = self.last_reported.len();
        self.last_reported
            .retain(|_, last| now.signed_duration_since(*last) < window);

        let excess = self.last_reported.len().saturating_sub(self.max_entries);
        if excess > 0 {
            let mut by_age: Vec<(String, DateTime<Utc>)> = self
                .last_reported
                .iter()
                .map(|(id, at)| (id.clone(), *at))
                .collect();
            by_age.sort_by_key(|(_, at)| *at);
            for (id, _) in by_age.into_iter().take(excess) {
                self.last_reported.remove(&id);
            }
        }

        tracing::debug!(
            evicted = before - self.last_reported.len(),
            remaining = self.last_reported.len(),
            "Debounce: evicted records"
        );
    }
}
