//! Reconcile loop tying wallet, session and connection together.
//!
//! The auth controller and the connection manager never call each other.
//! The coordinator observes the wallet signal, the session signal and the
//! connection event bus in one `tokio::select!` loop and, after each
//! signal, drives both towards the state the signals imply. It also owns
//! the reconnect policy and the ping cadence.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{MissedTickBehavior, Sleep};

use crate::auth::{AuthSessionController, Wallet};
use crate::domain::{Address, AuthStatus, ConnectionEvent, DisconnectReason};
use crate::ws::ConnectionManager;

/// Exponential reconnect delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(16));
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Wallet,
    Other,
}

/// Drives authentication and the push connection from the wallet signal.
#[derive(Debug)]
pub struct Coordinator {
    auth: AuthSessionController,
    connection: ConnectionManager,
    policy: ReconnectPolicy,
    ping_interval: Duration,
    backoff: Option<Pin<Box<Sleep>>>,
    attempt: u32,
    // Wallet address the backoff state belongs to.
    bound: Option<Address>,
}

impl Coordinator {
    /// Creates a coordinator over `auth` (and its wallet) and `connection`.
    #[must_use]
    pub fn new(
        auth: AuthSessionController,
        connection: ConnectionManager,
        policy: ReconnectPolicy,
        ping_interval: Duration,
    ) -> Self {
        Self {
            auth,
            connection,
            policy,
            ping_interval,
            backoff: None,
            attempt: 0,
            bound: None,
        }
    }

    fn wallet(&self) -> &Wallet {
        self.auth.wallet()
    }

    /// Runs until `shutdown` resolves, then closes the push connection.
    ///
    /// The session is left as is so a persisted token survives restarts.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut wallet_rx = self.wallet().subscribe();
        let mut session_rx = self.auth.subscribe();
        let mut events = self.connection.events();
        let mut ping = tokio::time::interval_at(
            tokio::time::Instant::now() + self.ping_interval,
            self.ping_interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!("coordinator started");
        self.reconcile(Trigger::Wallet);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                changed = wallet_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    tracing::debug!(wallet = ?self.wallet().current(), "wallet changed");
                    self.reconcile(Trigger::Wallet);
                }
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.reconcile(Trigger::Other);
                }
                event = events.recv() => match event {
                    Ok(ConnectionEvent::Connected) => {
                        self.attempt = 0;
                    }
                    Ok(ConnectionEvent::Disconnected { reason }) => {
                        self.on_disconnected(&reason);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "connection events lagged");
                        self.reconcile(Trigger::Other);
                    }
                    Err(RecvError::Closed) => break,
                },
                () = wait_backoff(&mut self.backoff) => {
                    self.backoff = None;
                    tracing::debug!(attempt = self.attempt, "reconnect backoff elapsed");
                    self.reconcile(Trigger::Other);
                }
                _ = ping.tick() => {
                    self.connection.ping();
                }
            }
        }

        self.backoff = None;
        self.connection.disconnect();
        tracing::info!("coordinator stopped");
    }

    fn reconcile(&mut self, trigger: Trigger) {
        let session = self.auth.session();
        let current = self.wallet().current();
        if current != self.bound {
            if self.backoff.take().is_some() {
                tracing::debug!("wallet changed; dropping pending reconnect");
            }
            self.attempt = 0;
            self.bound.clone_from(&current);
        }
        let Some(address) = current else {
            self.connection.disconnect();
            if session.address.is_some() || session.status != AuthStatus::Unauthenticated {
                tracing::info!("wallet disconnected; clearing session");
                self.auth.clear();
            }
            return;
        };

        if let Some(token) = session.token_for(&address) {
            if self.backoff.is_none() {
                self.connection.connect(token.clone());
            }
            return;
        }

        self.connection.disconnect();
        let needs_auth = !session.is_bound_to(&address)
            || match session.status {
                AuthStatus::Unauthenticated => true,
                AuthStatus::Failed => trigger == Trigger::Wallet,
                AuthStatus::Authenticating | AuthStatus::Authenticated => false,
            };
        if needs_auth {
            let auth = self.auth.clone();
            tokio::spawn(async move {
                if let Err(err) = auth.authenticate(&address).await {
                    tracing::debug!(error = %err, "background authentication ended");
                }
            });
        }
    }

    fn on_disconnected(&mut self, reason: &DisconnectReason) {
        if *reason == DisconnectReason::Unauthorized {
            let invalidated = self
                .connection
                .rejected_token()
                .is_some_and(|token| self.auth.invalidate(&token));
            if invalidated {
                tracing::warn!("push channel rejected session token; re-authenticating");
            } else {
                tracing::debug!("push channel rejected a superseded token");
                self.reconcile(Trigger::Other);
            }
            return;
        }
        if !reason.is_transport_failure()
            || !self.auth.is_authenticated()
            || self.wallet().current().is_none()
        {
            return;
        }
        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        tracing::info!(?delay, attempt = self.attempt, %reason, "scheduling reconnect");
        self.backoff = Some(Box::pin(tokio::time::sleep(delay)));
    }
}

async fn wait_backoff(backoff: &mut Option<Pin<Box<Sleep>>>) {
    match backoff {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
