//! Bounded, newest-first record of recently seen notifications.
//!
//! The log serves two purposes: it is the display list behind
//! `latest_notifications()`, and it is the deduplication window. Dismissed
//! ids are remembered for a retention period so a retransmission shortly
//! after a dismiss is still recognised as a duplicate.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::NotificationEvent;

/// Result of offering an event to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// The event was new and is now the newest entry.
    Accepted,
    /// An event with the same id is in the log or was recently dismissed.
    Duplicate,
}

/// Fixed-capacity, newest-first notification log.
#[derive(Debug)]
pub struct NotificationLog {
    entries: VecDeque<NotificationEvent>,
    capacity: usize,
    dismissed: HashMap<String, Instant>,
    dismiss_retention: Duration,
}

impl NotificationLog {
    /// Creates an empty log. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize, dismiss_retention: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            dismissed: HashMap::new(),
            dismiss_retention,
        }
    }

    /// Returns `true` if `id` is held or was dismissed within the
    /// retention window.
    pub fn is_duplicate(&mut self, id: &str, now: Instant) -> bool {
        self.prune_dismissed(now);
        self.contains(id) || self.dismissed.contains_key(id)
    }

    /// Offers an event, evicting the oldest entry when full.
    pub fn insert(&mut self, event: NotificationEvent, now: Instant) -> Insert {
        if self.is_duplicate(&event.id, now) {
            return Insert::Duplicate;
        }
        self.entries.push_front(event);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                tracing::trace!(id = %evicted.id, "notification evicted");
            }
        }
        Insert::Accepted
    }

    /// Removes an entry ahead of eviction. Returns `false` if absent.
    pub fn dismiss(&mut self, id: &str, now: Instant) -> bool {
        self.prune_dismissed(now);
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        self.entries.remove(pos);
        self.dismissed.insert(id.to_string(), now);
        true
    }

    /// Returns `true` if an entry with this id is currently held.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Snapshot of the log, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<NotificationEvent> {
        self.entries.iter().cloned().collect()
    }

    /// Number of held entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn prune_dismissed(&mut self, now: Instant) {
        let retention = self.dismiss_retention;
        self.dismissed
            .retain(|_, at| now.saturating_duration_since(*at) < retention);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::ChannelId;

    fn event(id: &str) -> NotificationEvent {
        let Ok(channel) = ChannelId::parse("events:global") else {
            panic!("valid channel");
        };
        NotificationEvent::new(id, channel, "transfer")
    }

    fn ids(log: &NotificationLog) -> Vec<String> {
        log.snapshot().into_iter().map(|e| e.id).collect()
    }

    #[test]
    fn newest_first_and_evicts_oldest() {
        let now = Instant::now();
        let mut log = NotificationLog::new(3, Duration::from_secs(60));
        for id in ["e1", "e2", "e3", "e4"] {
            assert_eq!(log.insert(event(id), now), Insert::Accepted);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(ids(&log), vec!["e4", "e3", "e2"]);
    }

    #[test]
    fn same_id_is_duplicate() {
        let now = Instant::now();
        let mut log = NotificationLog::new(10, Duration::from_secs(60));
        assert_eq!(log.insert(event("e1"), now), Insert::Accepted);
        assert_eq!(log.insert(event("e1"), now), Insert::Duplicate);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn dismissed_id_stays_duplicate_within_retention() {
        let start = Instant::now();
        let mut log = NotificationLog::new(10, Duration::from_secs(60));
        log.insert(event("e1"), start);
        assert!(log.dismiss("e1", start));
        assert!(log.is_empty());

        let soon = start + Duration::from_secs(30);
        assert_eq!(log.insert(event("e1"), soon), Insert::Duplicate);

        let later = start + Duration::from_secs(61);
        assert_eq!(log.insert(event("e1"), later), Insert::Accepted);
    }

    #[test]
    fn dismiss_unknown_returns_false() {
        let mut log = NotificationLog::new(10, Duration::from_secs(60));
        assert!(!log.dismiss("missing", Instant::now()));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let log = NotificationLog::new(0, Duration::from_secs(1));
        assert_eq!(log.capacity(), 1);
    }
}
