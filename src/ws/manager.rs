//! Connection manager: the single push-channel connection.
//!
//! State machine:
//!
//! ```text
//! Disconnected --connect(token)--> Connecting --open ok--> Connected
//! Connecting --open failed--> Disconnected
//! Connected --disconnect() / transport drop / malformed frame--> Disconnected
//! ```
//!
//! Each open runs as a link task with a generation number. `connect` with a
//! new token and `disconnect` bump the generation, so whatever a superseded
//! link task produces afterwards is discarded. The manager never retries on
//! its own: it reports `Disconnected { reason }` and leaves policy to the
//! caller.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::messages::{Inbound, WsCommand, decode};
use super::subscription::SubscriptionRegistry;
use super::transport::{Transport, TransportConnection};
use crate::domain::{
    ChannelId, ConnectionEvent, ConnectionStatus, DisconnectReason, EventBus, NotificationEvent,
    Token,
};
use crate::error::TransportError;

/// Inbound notification stream handed to the dispatcher.
pub type InboundEvents = mpsc::UnboundedReceiver<NotificationEvent>;

/// Capacity of the connection event bus.
const EVENT_BUS_CAPACITY: usize = 64;

/// Ping bookkeeping. Information only: nothing here forces a disconnect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Liveness {
    /// Pings written to the transport.
    pub pings_sent: u64,
    /// Pongs matched to the outstanding ping.
    pub pongs_received: u64,
    /// Pings that were still unanswered when the next one was sent.
    pub missed_pongs: u64,
    /// Round trip of the last answered ping.
    pub last_round_trip: Option<Duration>,
}

enum LinkCommand {
    Send(String),
    Close,
}

struct Link {
    token: Token,
    commands: mpsc::UnboundedSender<LinkCommand>,
    task: AbortHandle,
}

#[derive(Default)]
struct State {
    status: ConnectionStatus,
    generation: u64,
    // Present exactly while Connecting or Connected.
    link: Option<Link>,
    subscriptions: SubscriptionRegistry,
    last_error: Option<DisconnectReason>,
    // Token of the last link the server refused as unauthorized.
    rejected_token: Option<Token>,
    liveness: Liveness,
    pending_ping: Option<(String, Instant)>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    url: String,
    state: Mutex<State>,
    status_tx: watch::Sender<ConnectionStatus>,
    bus: EventBus,
    events_tx: mpsc::UnboundedSender<NotificationEvent>,
    events_rx: Mutex<Option<InboundEvents>>,
}

/// Owns the one push connection and its channel subscriptions.
///
/// Cloning yields another handle to the same manager.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Creates a disconnected manager that will open `url` via `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                transport,
                url: url.into(),
                state: Mutex::new(State::default()),
                status_tx,
                bus: EventBus::new(EVENT_BUS_CAPACITY),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
            }),
        }
    }

    /// Starts connecting with `token`.
    ///
    /// No-op while Connecting/Connected with the same token. A different
    /// token first tears the current link down (`TokenChanged`). Failures
    /// are reported through [`events`](Self::events), never returned.
    pub fn connect(&self, token: Token) {
        let mut state = self.shared.state.lock();
        if let Some(link) = &state.link {
            if link.token == token {
                tracing::trace!(status = ?state.status, "connect ignored; already using this token");
                return;
            }
            tracing::info!("session token changed; reopening push channel");
            self.shared
                .teardown(&mut state, DisconnectReason::TokenChanged);
        }

        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Arc::clone(&self.shared).run_link(
            generation,
            token.clone(),
            command_rx,
        ));
        state.link = Some(Link {
            token,
            commands,
            task: task.abort_handle(),
        });
        self.shared
            .set_status(&mut state, ConnectionStatus::Connecting);
        tracing::info!(url = %self.shared.url, "connecting push channel");
    }

    /// Closes the connection (or abandons a pending open).
    pub fn disconnect(&self) {
        let mut state = self.shared.state.lock();
        self.shared.teardown(&mut state, DisconnectReason::Requested);
    }

    /// Adds a reference to `channel`; the transport hears about it on the
    /// first reference only. While not connected the subscription is kept
    /// and replayed on the next successful open.
    pub fn subscribe(&self, channel: ChannelId) {
        let mut state = self.shared.state.lock();
        if state.subscriptions.acquire(&channel) {
            tracing::debug!(%channel, "channel subscribed");
            if state.status == ConnectionStatus::Connected {
                Shared::send_command(
                    &state,
                    &WsCommand::Subscribe {
                        channels: vec![channel],
                    },
                );
            }
        }
    }

    /// Drops a reference to `channel`; the transport hears about it when
    /// the last reference goes.
    pub fn unsubscribe(&self, channel: &ChannelId) {
        let mut state = self.shared.state.lock();
        if state.subscriptions.release(channel) {
            tracing::debug!(%channel, "channel unsubscribed");
            if state.status == ConnectionStatus::Connected {
                Shared::send_command(
                    &state,
                    &WsCommand::Unsubscribe {
                        channels: vec![channel.clone()],
                    },
                );
            }
        }
    }

    /// Sends a ping if connected. Returns whether one was sent.
    ///
    /// The caller owns the cadence. A previous ping that is still
    /// unanswered is counted as missed.
    pub fn ping(&self) -> bool {
        let mut state = self.shared.state.lock();
        if state.status != ConnectionStatus::Connected {
            return false;
        }
        if let Some((id, sent_at)) = state.pending_ping.take() {
            state.liveness.missed_pongs = state.liveness.missed_pongs.saturating_add(1);
            tracing::warn!(ping_id = %id, waited = ?sent_at.elapsed(), "pong not received");
        }
        let Some(id) = Shared::send_command(&state, &WsCommand::Ping) else {
            return false;
        };
        state.pending_ping = Some((id, Instant::now()));
        state.liveness.pings_sent = state.liveness.pings_sent.saturating_add(1);
        true
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.state.lock().status
    }

    /// Receiver notified on every status change.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Registers a connect/disconnect listener.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.bus.subscribe()
    }

    /// Takes the inbound notification stream. Only the first call gets it.
    pub fn take_events(&self) -> Option<InboundEvents> {
        self.shared.events_rx.lock().take()
    }

    /// Channels with a positive reference count, in subscription order.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<ChannelId> {
        self.shared.state.lock().subscriptions.active()
    }

    /// Reason of the last unrequested disconnect.
    #[must_use]
    pub fn last_error(&self) -> Option<DisconnectReason> {
        self.shared.state.lock().last_error.clone()
    }

    /// Token the server refused on the last `Unauthorized` disconnect.
    ///
    /// Lets the caller invalidate exactly the token that was rejected
    /// rather than whatever it holds by the time it handles the event.
    #[must_use]
    pub fn rejected_token(&self) -> Option<Token> {
        self.shared.state.lock().rejected_token.clone()
    }

    /// Ping statistics.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.shared.state.lock().liveness
    }
}

impl Clone for ConnectionManager {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.shared.url)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn set_status(&self, state: &mut State, status: ConnectionStatus) {
        state.status = status;
        self.status_tx.send_replace(status);
    }

    /// Drops the current link, if any, and reports `reason`.
    fn teardown(&self, state: &mut State, reason: DisconnectReason) {
        let Some(link) = state.link.take() else {
            return;
        };
        state.generation = state.generation.wrapping_add(1);
        if state.status == ConnectionStatus::Connected {
            // Let the link close the transport cleanly.
            if link.commands.send(LinkCommand::Close).is_err() {
                link.task.abort();
            }
        } else {
            link.task.abort();
        }
        state.pending_ping = None;
        self.set_status(state, ConnectionStatus::Disconnected);
        tracing::info!(%reason, "push channel closed");
        self.bus.publish(ConnectionEvent::Disconnected { reason });
    }

    /// Queues a command on the live link. Returns the envelope id.
    fn send_command(state: &State, command: &WsCommand) -> Option<String> {
        let link = state.link.as_ref()?;
        let frame = match command.encode() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "cannot encode command");
                return None;
            }
        };
        link.commands.send(LinkCommand::Send(frame.text)).ok()?;
        Some(frame.id)
    }

    async fn run_link(
        self: Arc<Self>,
        generation: u64,
        token: Token,
        mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    ) {
        let mut conn = match self.transport.open(&self.url, &token).await {
            Ok(conn) => conn,
            Err(err) => {
                let reason = match err {
                    TransportError::Unauthorized => DisconnectReason::Unauthorized,
                    other => DisconnectReason::OpenFailed(other.to_string()),
                };
                self.link_failed(generation, reason);
                return;
            }
        };

        let replay = {
            let mut state = self.state.lock();
            if state.generation == generation {
                self.set_status(&mut state, ConnectionStatus::Connected);
                state.last_error = None;
                self.bus.publish(ConnectionEvent::Connected);
                Some(state.subscriptions.active())
            } else {
                None
            }
        };
        let Some(replay) = replay else {
            tracing::debug!("discarding superseded push channel");
            conn.close().await;
            return;
        };
        tracing::info!(channels = replay.len(), "push channel connected");

        // Replay before draining queued commands keeps per-channel order.
        for channel in replay {
            let command = WsCommand::Subscribe {
                channels: vec![channel],
            };
            let sent = match command.encode() {
                Ok(frame) => conn.send(frame.text).await,
                Err(err) => Err(err),
            };
            if let Err(err) = sent {
                conn.close().await;
                self.link_failed(generation, DisconnectReason::Closed(err.to_string()));
                return;
            }
        }

        self.pump(generation, conn.as_mut(), &mut commands).await;
    }

    async fn pump(
        &self,
        generation: u64,
        conn: &mut dyn TransportConnection,
        commands: &mut mpsc::UnboundedReceiver<LinkCommand>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(LinkCommand::Send(text)) => {
                        if let Err(err) = conn.send(text).await {
                            conn.close().await;
                            self.link_failed(generation, DisconnectReason::Closed(err.to_string()));
                            return;
                        }
                    }
                    Some(LinkCommand::Close) | None => {
                        conn.close().await;
                        return;
                    }
                },
                inbound = conn.recv() => match inbound {
                    Ok(text) => match decode(&text) {
                        Ok(frame) => self.handle_inbound(generation, frame),
                        Err(err) => {
                            conn.close().await;
                            let detail = match err {
                                TransportError::Malformed(detail) => detail,
                                other => other.to_string(),
                            };
                            self.link_failed(generation, DisconnectReason::Malformed(detail));
                            return;
                        }
                    },
                    Err(TransportError::Unauthorized) => {
                        self.link_failed(generation, DisconnectReason::Unauthorized);
                        return;
                    }
                    Err(err) => {
                        let detail = match err {
                            TransportError::Closed(detail) => detail,
                            other => other.to_string(),
                        };
                        self.link_failed(generation, DisconnectReason::Closed(detail));
                        return;
                    }
                },
            }
        }
    }

    fn handle_inbound(&self, generation: u64, frame: Inbound) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        match frame {
            Inbound::Event(event) => {
                tracing::trace!(id = %event.id, channel = %event.channel, "event received");
                if self.events_tx.send(event).is_err() {
                    tracing::debug!("no consumer for inbound events");
                }
            }
            Inbound::Pong { id } => match state.pending_ping.take() {
                Some((expected, sent_at)) if expected == id => {
                    state.liveness.pongs_received = state.liveness.pongs_received.saturating_add(1);
                    state.liveness.last_round_trip = Some(sent_at.elapsed());
                }
                other => {
                    state.pending_ping = other;
                    tracing::debug!(pong_id = %id, "unexpected pong");
                }
            },
            Inbound::Response { id, payload } => {
                tracing::debug!(command_id = %id, %payload, "command acknowledged");
            }
            Inbound::Error { id, message } => {
                tracing::warn!(command_id = %id, %message, "server rejected command");
            }
        }
    }

    fn link_failed(&self, generation: u64, reason: DisconnectReason) {
        let mut state = self.state.lock();
        if state.generation != generation {
            tracing::debug!(%reason, "discarding result of superseded push channel");
            return;
        }
        let link = state.link.take();
        if reason == DisconnectReason::Unauthorized {
            state.rejected_token = link.map(|link| link.token);
        }
        state.pending_ping = None;
        state.last_error = Some(reason.clone());
        self.set_status(&mut state, ConnectionStatus::Disconnected);
        tracing::warn!(%reason, "push channel lost");
        self.bus.publish(ConnectionEvent::Disconnected { reason });
    }
}
