//! Reconciliation Buffer
//!
//! Bounded, newest-first, duplicate-free window over every event the
//! snapshot and stream channels have delivered. Ordering is by parsed
//! timestamp; unparseable timestamps sort after every valid one. When the
//! window overflows the oldest entries are dropped.
//!
//! Ties are broken by arrival channel: a streamed event goes ahead of
//! existing events with the same instant, snapshot events go behind them
//! in page order.

use log::debug;
use siem_lite_common::{EventKey, LogEvent, OrderKey};
use std::collections::HashSet;

/// Counts for one admission call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdmissionOutcome {
    pub admitted: usize,
    pub duplicates: usize,
    pub evicted: usize,
}

impl AdmissionOutcome {
    pub fn changed(&self) -> bool {
        self.admitted > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TiePlacement {
    AheadOfTies,
    BehindTies,
}

#[derive(Debug, Clone)]
pub struct ReconciliationBuffer {
    capacity: usize,
    entries: Vec<LogEvent>,
    keys: HashSet<EventKey>,
}

impl ReconciliationBuffer {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Vec::with_capacity(capacity + 1),
            keys: HashSet::with_capacity(capacity + 1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest first.
    pub fn events(&self) -> &[LogEvent] {
        &self.entries
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.keys.contains(key)
    }

    /// Merge a snapshot page. Events already present are ignored; nothing
    /// is ever removed because it is missing from the page.
    pub fn admit_snapshot<I>(&mut self, events: I) -> AdmissionOutcome
    where
        I: IntoIterator<Item = LogEvent>,
    {
        let mut outcome = AdmissionOutcome::default();
        for event in events {
            if self.insert(event, TiePlacement::BehindTies) {
                outcome.admitted += 1;
            } else {
                outcome.duplicates += 1;
            }
        }
        outcome.evicted = self.enforce_capacity();

        debug!(
            "Snapshot merge: {} admitted, {} duplicates, {} evicted, {} buffered",
            outcome.admitted,
            outcome.duplicates,
            outcome.evicted,
            self.entries.len()
        );
        outcome
    }

    /// Insert one pushed event.
    pub fn admit_streamed(&mut self, event: LogEvent) -> AdmissionOutcome {
        let mut outcome = AdmissionOutcome::default();
        if self.insert(event, TiePlacement::AheadOfTies) {
            outcome.admitted = 1;
            outcome.evicted = self.enforce_capacity();
        } else {
            outcome.duplicates = 1;
        }
        outcome
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.keys.clear();
    }

    fn insert(&mut self, event: LogEvent, placement: TiePlacement) -> bool {
        let key = event.key();
        if self.keys.contains(&key) {
            return false;
        }

        let position = self.position_for(event.order_key, placement);
        self.keys.insert(key);
        self.entries.insert(position, event);
        true
    }

    fn position_for(&self, order_key: OrderKey, placement: TiePlacement) -> usize {
        match placement {
            TiePlacement::AheadOfTies => self.entries.partition_point(|e| e.order_key > order_key),
            TiePlacement::BehindTies => self.entries.partition_point(|e| e.order_key >= order_key),
        }
    }

    fn enforce_capacity(&mut self) -> usize {
        if self.entries.len() <= self.capacity {
            return 0;
        }

        let dropped: Vec<LogEvent> = self.entries.drain(self.capacity..).collect();
        for event in &dropped {
            self.keys.remove(&event.key());
        }
        dropped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(ts: &str, actor: &str) -> LogEvent {
        LogEvent::new(ts, actor, "LOGIN_FAILED")
    }

    fn actors(buffer: &ReconciliationBuffer) -> Vec<&str> {
        buffer
            .events()
            .iter()
            .map(|e| e.actor_address.as_str())
            .collect()
    }

    #[test]
    fn should_order_snapshot_newest_first() {
        let mut buffer = ReconciliationBuffer::new(10);

        buffer.admit_snapshot(vec![event("10", "a"), event("30", "c"), event("20", "b")]);

        assert_eq!(actors(&buffer), vec!["c", "b", "a"]);
    }

    #[test]
    fn should_reject_duplicates_across_channels() {
        let mut buffer = ReconciliationBuffer::new(10);
        buffer.admit_snapshot(vec![event("10", "a")]);

        let outcome = buffer.admit_streamed(event("10", "a"));

        assert_eq!(outcome.admitted, 0);
        assert_eq!(outcome.duplicates, 1);
        assert!(!outcome.changed());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn should_drop_oldest_on_overflow() {
        let mut buffer = ReconciliationBuffer::new(3);
        buffer.admit_snapshot(vec![event("10", "a"), event("20", "b"), event("30", "c")]);

        let outcome = buffer.admit_streamed(event("40", "d"));

        assert_eq!(outcome.evicted, 1);
        assert_eq!(actors(&buffer), vec!["d", "c", "b"]);
        assert!(!buffer.contains(&event("10", "a").key()));
    }

    #[test]
    fn should_readmit_evicted_event_only_if_it_fits() {
        let mut buffer = ReconciliationBuffer::new(2);
        buffer.admit_snapshot(vec![event("20", "b"), event("30", "c")]);

        let outcome = buffer.admit_snapshot(vec![event("10", "a")]);

        assert_eq!(outcome.admitted, 1);
        assert_eq!(outcome.evicted, 1);
        assert_eq!(actors(&buffer), vec!["c", "b"]);
    }

    #[test]
    fn should_place_streamed_event_ahead_of_ties() {
        let mut buffer = ReconciliationBuffer::new(10);
        buffer.admit_snapshot(vec![event("10", "a")]);

        buffer.admit_streamed(event("10", "pushed"));

        assert_eq!(actors(&buffer), vec!["pushed", "a"]);
    }

    #[test]
    fn should_keep_page_order_for_snapshot_ties() {
        let mut buffer = ReconciliationBuffer::new(10);
        buffer.admit_streamed(event("10", "pushed"));

        buffer.admit_snapshot(vec![event("10", "first"), event("10", "second")]);

        assert_eq!(actors(&buffer), vec!["pushed", "first", "second"]);
    }

    #[test]
    fn should_sort_unparseable_timestamps_last() {
        let mut buffer = ReconciliationBuffer::new(10);

        buffer.admit_snapshot(vec![event("garbage", "x"), event("10", "a")]);
        buffer.admit_streamed(event("also garbage", "y"));

        assert_eq!(actors(&buffer), vec!["a", "y", "x"]);
    }

    #[test]
    fn should_clear_keys_on_reset() {
        let mut buffer = ReconciliationBuffer::new(10);
        buffer.admit_snapshot(vec![event("10", "a")]);

        buffer.reset();

        assert!(buffer.is_empty());
        assert_eq!(buffer.admit_streamed(event("10", "a")).admitted, 1);
    }

    #[test]
    fn should_raise_zero_capacity_to_one() {
        let buffer = ReconciliationBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
    }
}
