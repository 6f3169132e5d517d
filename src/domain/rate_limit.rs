//! Per-channel sliding-window rate limiter for inbound notifications.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::ChannelId;

/// Allows at most `max_events` per channel within any `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_events: usize,
    window: Duration,
    recent: HashMap<ChannelId, VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter. `max_events` of zero blocks everything.
    #[must_use]
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            max_events,
            window,
            recent: HashMap::new(),
        }
    }

    /// Records an arrival on `channel` and reports whether it is allowed.
    ///
    /// Rejected arrivals do not consume budget.
    pub fn allow(&mut self, channel: &ChannelId, now: Instant) -> bool {
        let stamps = self.recent.entry(channel.clone()).or_default();
        while let Some(oldest) = stamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }
        if stamps.len() >= self.max_events {
            return false;
        }
        stamps.push_back(now);
        true
    }
}
