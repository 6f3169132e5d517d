//! Notification dispatcher: dedupe, rate-limit, log and fan out.
//!
//! Consumes the connection manager's inbound stream. Each event is checked
//! against the bounded log (duplicates are dropped silently and counted),
//! then against the per-channel rate limit, then inserted newest-first and
//! delivered synchronously to every listener in registration order.
//! A panicking listener is isolated so later listeners still see the event.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::{Insert, NotificationEvent, NotificationLog, RateLimiter};
use crate::ws::InboundEvents;

/// Listener callback.
pub type Listener = Arc<dyn Fn(&NotificationEvent) + Send + Sync>;

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Bounded log capacity.
    pub capacity: usize,
    /// How long a dismissed id still counts as a duplicate.
    pub dismiss_retention: Duration,
    /// Per-channel limit as `(max events, window)`; `None` disables it.
    pub rate_limit: Option<(usize, Duration)>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            dismiss_retention: Duration::from_secs(60),
            rate_limit: Some((20, Duration::from_secs(1))),
        }
    }
}

/// What happened to an offered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Inserted and delivered to this many listeners.
    Delivered {
        /// Number of listeners invoked.
        listeners: usize,
    },
    /// Already seen; dropped.
    Duplicate,
    /// Channel over its rate limit; dropped.
    RateLimited,
}

/// Dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Events inserted and fanned out.
    pub accepted: u64,
    /// Events dropped as duplicates.
    pub duplicates: u64,
    /// Events dropped by the rate limit.
    pub rate_limited: u64,
    /// Listener invocations that panicked.
    pub listener_failures: u64,
}

struct Book {
    log: NotificationLog,
    limiter: Option<RateLimiter>,
    stats: DispatchStats,
}

struct Inner {
    book: Mutex<Book>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
}

/// Fans inbound notifications out to registered listeners.
///
/// Cloning yields another handle to the same dispatcher.
pub struct NotificationDispatcher {
    inner: Arc<Inner>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher with an empty log.
    #[must_use]
    pub fn new(config: &DispatcherConfig) -> Self {
        let limiter = config
            .rate_limit
            .map(|(max_events, window)| RateLimiter::new(max_events, window));
        Self {
            inner: Arc::new(Inner {
                book: Mutex::new(Book {
                    log: NotificationLog::new(config.capacity, config.dismiss_retention),
                    limiter,
                    stats: DispatchStats::default(),
                }),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// Registers a listener. Delivery follows registration order.
    pub fn on_notification<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        ListenerHandle {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Offers one event.
    pub fn ingest(&self, event: NotificationEvent) -> DispatchOutcome {
        let now = Instant::now();
        {
            let mut book = self.inner.book.lock();
            if book.log.is_duplicate(&event.id, now) {
                book.stats.duplicates = book.stats.duplicates.saturating_add(1);
                tracing::debug!(id = %event.id, "duplicate notification ignored");
                return DispatchOutcome::Duplicate;
            }
            let allowed = match book.limiter.as_mut() {
                Some(limiter) => limiter.allow(&event.channel, now),
                None => true,
            };
            if !allowed {
                book.stats.rate_limited = book.stats.rate_limited.saturating_add(1);
                tracing::debug!(id = %event.id, channel = %event.channel, "notification rate limited");
                return DispatchOutcome::RateLimited;
            }
            if book.log.insert(event.clone(), now) == Insert::Duplicate {
                return DispatchOutcome::Duplicate;
            }
            book.stats.accepted = book.stats.accepted.saturating_add(1);
        }

        // Listeners run without locks held so they may call back in.
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        let mut failures = 0_u64;
        for listener in &listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                failures = failures.saturating_add(1);
                tracing::error!(id = %event.id, "notification listener panicked");
            }
        }
        if failures > 0 {
            let mut book = self.inner.book.lock();
            book.stats.listener_failures = book.stats.listener_failures.saturating_add(failures);
        }
        DispatchOutcome::Delivered {
            listeners: listeners.len(),
        }
    }

    /// Drains `events` until the stream ends.
    ///
    /// Borrows the stream so a caller that stops early can hand it to the
    /// next run.
    pub async fn run(&self, events: &mut InboundEvents) {
        while let Some(event) = events.recv().await {
            self.ingest(event);
        }
        tracing::debug!("inbound notification stream ended");
    }

    /// Bounded log snapshot, newest first.
    #[must_use]
    pub fn latest(&self) -> Vec<NotificationEvent> {
        self.inner.book.lock().log.snapshot()
    }

    /// Removes `id` from the log. Returns `false` if it was not there.
    pub fn dismiss(&self, id: &str) -> bool {
        self.inner.book.lock().log.dismiss(id, Instant::now())
    }

    /// Counters since creation.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.inner.book.lock().stats
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }
}

impl Clone for NotificationDispatcher {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("stats", &self.stats())
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

/// Registration returned by [`NotificationDispatcher::on_notification`].
#[must_use = "dropping the handle keeps the listener registered; call unsubscribe to remove it"]
pub struct ListenerHandle {
    id: u64,
    inner: Weak<Inner>,
}

impl ListenerHandle {
    /// Removes the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.inner.upgrade() else {
            return false;
        };
        let mut listeners = inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        listeners.len() != before
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .finish()
    }
}
