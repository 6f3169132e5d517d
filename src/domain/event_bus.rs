//! Fan-out of lifecycle events to any number of observers.
//!
//! The connection manager owns one bus of [`ConnectionEvent`]s. Observers
//! (the coordinator, UI status indicators, tests) each hold their own
//! receiver; a slow observer lags and skips events instead of blocking the
//! publisher.

use tokio::sync::broadcast;

use super::ConnectionEvent;

/// Broadcast bus, by default carrying [`ConnectionEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus<E = ConnectionEvent> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Creates a bus retaining up to `capacity` undelivered events per
    /// receiver (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Delivers `event` to every current observer and returns how many there
    /// were. Without observers the event is dropped.
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Registers an observer for events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
