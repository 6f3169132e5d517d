//! Transient toast queue fed by the dispatcher.
//!
//! Every delivered notification becomes a toast that disappears after a
//! fixed TTL or on manual dismissal, whichever comes first. Expiry only
//! touches the toast; the dispatcher's log keeps the event.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use super::dispatcher::{ListenerHandle, NotificationDispatcher};
use crate::domain::NotificationEvent;

/// A visible toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    /// Notification shown by the toast.
    pub event: NotificationEvent,
    /// When the toast appeared.
    pub shown_at: DateTime<Utc>,
}

struct Entry {
    seq: u64,
    toast: Toast,
    timer: Option<AbortHandle>,
}

struct Inner {
    ttl: Duration,
    max_visible: usize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_seq: u64,
    // Newest first.
    entries: VecDeque<Entry>,
}

/// Auto-expiring toasts, newest first.
pub struct ToastQueue {
    inner: Arc<Inner>,
}

impl ToastQueue {
    /// Creates an empty queue. `max_visible` is at least one.
    #[must_use]
    pub fn new(ttl: Duration, max_visible: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                ttl,
                max_visible: max_visible.max(1),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Feeds every notification `dispatcher` delivers into this queue.
    pub fn attach(&self, dispatcher: &NotificationDispatcher) -> ListenerHandle {
        let queue = Arc::downgrade(&self.inner);
        dispatcher.on_notification(move |event| {
            if let Some(inner) = queue.upgrade() {
                Inner::push(&inner, event.clone());
            }
        })
    }

    /// Shows `event` as a toast.
    ///
    /// Outside a Tokio runtime the toast is shown without an expiry timer.
    pub fn push(&self, event: NotificationEvent) {
        Inner::push(&self.inner, event);
    }

    /// Hides a toast early. Returns `false` if no toast shows `id`.
    pub fn dismiss(&self, id: &str) -> bool {
        let mut state = self.inner.state.lock();
        let Some(pos) = state.entries.iter().position(|e| e.toast.event.id == id) else {
            return false;
        };
        if let Some(entry) = state.entries.remove(pos) {
            entry.cancel();
        }
        true
    }

    /// Visible toasts, newest first.
    #[must_use]
    pub fn visible(&self) -> Vec<Toast> {
        self.inner
            .state
            .lock()
            .entries
            .iter()
            .map(|e| e.toast.clone())
            .collect()
    }

    /// Hides every toast and stops their timers.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        for entry in state.entries.drain(..) {
            entry.cancel();
        }
    }

    /// Time a toast stays visible.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }
}

impl Inner {
    fn push(this: &Arc<Self>, event: NotificationEvent) {
        let mut state = this.state.lock();
        let seq = state.next_seq;
        state.next_seq = state.next_seq.wrapping_add(1);

        let timer = Handle::try_current().ok().map(|runtime| {
            let queue: Weak<Self> = Arc::downgrade(this);
            let ttl = this.ttl;
            runtime
                .spawn(async move {
                    tokio::time::sleep(ttl).await;
                    if let Some(inner) = queue.upgrade() {
                        inner.expire(seq);
                    }
                })
                .abort_handle()
        });

        state.entries.push_front(Entry {
            seq,
            toast: Toast {
                event,
                shown_at: Utc::now(),
            },
            timer,
        });
        while state.entries.len() > this.max_visible {
            if let Some(entry) = state.entries.pop_back() {
                entry.cancel();
            }
        }
    }

    fn expire(&self, seq: u64) {
        let mut state = self.state.lock();
        if let Some(pos) = state.entries.iter().position(|e| e.seq == seq) {
            state.entries.remove(pos);
        }
    }
}

impl Entry {
    fn cancel(self) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for entry in self.state.get_mut().entries.drain(..) {
            entry.cancel();
        }
    }
}

impl Clone for ToastQueue {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for ToastQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToastQueue")
            .field("ttl", &self.inner.ttl)
            .field("max_visible", &self.inner.max_visible)
            .field("visible", &self.inner.state.lock().entries.len())
            .finish()
    }
}
