//! Reference-counted channel subscriptions.
//!
//! Several independent features may subscribe to the same channel over the
//! one push connection. The transport only needs to hear about the first
//! subscriber (0 → 1) and the last unsubscriber (1 → 0); everything in
//! between is bookkeeping here.

use std::collections::HashMap;

use crate::domain::ChannelId;

#[derive(Debug, Clone, Copy)]
struct Entry {
    ref_count: usize,
    // Order of the 0 → 1 transition, for replays.
    seq: u64,
}

/// Tracks channel reference counts for the connection manager.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    channels: HashMap<ChannelId, Entry>,
    next_seq: u64,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reference. Returns `true` on the 0 → 1 transition, i.e. when
    /// a subscribe command must go to the transport.
    pub fn acquire(&mut self, channel: &ChannelId) -> bool {
        if let Some(entry) = self.channels.get_mut(channel) {
            entry.ref_count = entry.ref_count.saturating_add(1);
            return false;
        }
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.channels
            .insert(channel.clone(), Entry { ref_count: 1, seq });
        true
    }

    /// Drops a reference. Returns `true` on the 1 → 0 transition, i.e. when
    /// an unsubscribe command must go to the transport. Releasing an
    /// unknown channel is a no-op.
    pub fn release(&mut self, channel: &ChannelId) -> bool {
        let Some(entry) = self.channels.get_mut(channel) else {
            return false;
        };
        if entry.ref_count > 1 {
            entry.ref_count -= 1;
            return false;
        }
        self.channels.remove(channel);
        true
    }

    /// Channels with a positive reference count, in first-subscribe order.
    #[must_use]
    pub fn active(&self) -> Vec<ChannelId> {
        let mut entries: Vec<(&ChannelId, &Entry)> = self.channels.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.seq);
        entries.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Reference count for `channel` (zero if not subscribed).
    #[must_use]
    pub fn ref_count(&self, channel: &ChannelId) -> usize {
        self.channels.get(channel).map_or(0, |e| e.ref_count)
    }

    /// Number of subscribed channels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.channels.len()
    }
}
