//! Notifications pushed by the server over a subscribed channel.
//!
//! A [`NotificationEvent`] arrives as the payload of an `event` frame. Its
//! `id` identifies the logical event; the same id may be retransmitted
//! after a reconnect and is deduplicated by the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChannelId;

/// A single server-side event delivered to UI features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Logical event identity used for deduplication.
    pub id: String,
    /// Channel the event was published on.
    pub channel: ChannelId,
    /// Event kind discriminator (e.g. `"transfer"`).
    pub kind: String,
    /// Short human-readable title.
    #[serde(default)]
    pub title: String,
    /// Longer human-readable body.
    #[serde(default)]
    pub body: String,
    /// When the event happened upstream. Display metadata only; ordering
    /// follows arrival.
    pub occurred_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(id: impl Into<String>, channel: ChannelId, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel,
            kind: kind.into(),
            title: String::new(),
            body: String::new(),
            occurred_at: Utc::now(),
        }
    }

    /// Sets title and body.
    #[must_use]
    pub fn with_text(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.title = title.into();
        self.body = body.into();
        self
    }
}
