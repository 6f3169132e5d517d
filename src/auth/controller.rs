//! Auth session controller: wallet address → session token.
//!
//! At most one authentication attempt is in flight at a time. The attempt
//! runs as its own task and is shared: every caller asking for the same
//! address while it is pending awaits the same outcome, so near-simultaneous
//! triggers produce exactly one signature prompt.
//!
//! Every attempt is stamped with an epoch. [`AuthSessionController::clear`]
//! (logout / wallet disconnect) bumps the epoch and aborts the task; a result
//! that arrives under an older epoch, or after the wallet stopped pointing at
//! the attempt's address, is discarded instead of being applied.

use std::fmt;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use super::wallet::wallet_left;
use super::{IdentityProvider, Wallet, WalletSigner};
use crate::domain::{Address, AuthState, AuthStatus, Session, Token};
use crate::error::AuthError;
use crate::store::SessionStore;

type SharedOutcome = Shared<BoxFuture<'static, Result<Token, AuthError>>>;

/// Converts a connected wallet address into a session token and owns the
/// resulting [`Session`].
///
/// Cloning yields another handle to the same controller.
pub struct AuthSessionController {
    inner: Arc<Inner>,
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    signer: Arc<dyn WalletSigner>,
    store: Arc<dyn SessionStore>,
    wallet: Wallet,
    tracker: Mutex<Tracker>,
    session_tx: watch::Sender<Session>,
}

#[derive(Default)]
struct Tracker {
    session: Session,
    epoch: u64,
    in_flight: Option<InFlight>,
}

struct InFlight {
    address: Address,
    outcome: SharedOutcome,
    abort: AbortHandle,
}

impl AuthSessionController {
    /// Creates a controller with an unauthenticated session.
    ///
    /// A token already in `store` is not trusted until the first
    /// [`authenticate`](Self::authenticate) validates it.
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        signer: Arc<dyn WalletSigner>,
        store: Arc<dyn SessionStore>,
        wallet: Wallet,
    ) -> Self {
        let (session_tx, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(Inner {
                identity,
                signer,
                store,
                wallet,
                tracker: Mutex::new(Tracker::default()),
                session_tx,
            }),
        }
    }

    /// Authenticates the connected wallet `address`.
    ///
    /// Validates a held token when there is one; otherwise (or when the
    /// token is rejected) runs the challenge → signature → token exchange.
    /// Joins the in-flight attempt if one is already running for `address`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NoWallet`] if the wallet is not connected to `address`.
    /// - [`AuthError::SignatureRejected`], [`AuthError::TokenExchange`],
    ///   [`AuthError::Identity`] on failure; the session becomes `Failed`.
    /// - [`AuthError::Cancelled`] if the attempt was superseded.
    pub async fn authenticate(&self, address: &Address) -> Result<Token, AuthError> {
        if self.inner.wallet.current().as_ref() != Some(address) {
            return Err(AuthError::NoWallet);
        }
        Inner::begin(&self.inner, address).await
    }

    /// Logs out: cancels any pending attempt, clears the stored token and
    /// resets the session.
    pub fn clear(&self) {
        let mut tracker = self.inner.tracker.lock();
        tracker.epoch = tracker.epoch.wrapping_add(1);
        if let Some(in_flight) = tracker.in_flight.take() {
            tracing::debug!(address = %in_flight.address, "pending authentication cancelled");
            in_flight.abort.abort();
        }
        self.inner.clear_store();
        if tracker.session != Session::default() {
            tracker.session = Session::default();
            self.inner.publish(&tracker.session);
            tracing::info!("session cleared");
        }
    }

    /// Drops `token` after the server rejected it.
    ///
    /// The address stays bound so the next trigger re-authenticates it.
    /// Returns `false` when `token` is no longer the current token.
    pub fn invalidate(&self, token: &Token) -> bool {
        let mut tracker = self.inner.tracker.lock();
        if tracker.session.token.as_ref() != Some(token) {
            return false;
        }
        self.inner.clear_store();
        tracker.session.token = None;
        tracker.session.status = AuthStatus::Unauthenticated;
        self.inner.publish(&tracker.session);
        tracing::warn!(address = ?tracker.session.address, "session token rejected by server");
        true
    }

    /// Current session snapshot.
    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.session_tx.borrow().clone()
    }

    /// UI-facing status and address.
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.inner.session_tx.borrow().auth_state()
    }

    /// Returns `true` if a token is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.session_tx.borrow().status == AuthStatus::Authenticated
    }

    /// Receiver notified on every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.session_tx.subscribe()
    }

    /// The wallet signal this controller authenticates against.
    #[must_use]
    pub fn wallet(&self) -> &Wallet {
        &self.inner.wallet
    }
}

impl Clone for AuthSessionController {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for AuthSessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSessionController")
            .field("session", &self.session())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Joins or starts the attempt for `address`.
    fn begin(this: &Arc<Self>, address: &Address) -> SharedOutcome {
        let mut tracker = this.tracker.lock();

        if let Some(in_flight) = &tracker.in_flight
            && &in_flight.address == address
        {
            tracing::debug!(%address, "joining in-flight authentication");
            return in_flight.outcome.clone();
        }
        if let Some(stale) = tracker.in_flight.take() {
            tracing::info!(previous = %stale.address, %address, "wallet switched; cancelling attempt");
            stale.abort.abort();
        }

        let held = this.held_token(&tracker.session, address);
        tracker.epoch = tracker.epoch.wrapping_add(1);
        let epoch = tracker.epoch;

        // Re-validating a live token keeps the session authenticated.
        if tracker.session.token_for(address).is_none() {
            tracker.session = Session {
                address: Some(address.clone()),
                token: None,
                status: AuthStatus::Authenticating,
            };
            this.publish(&tracker.session);
        }

        let task = tokio::spawn(Arc::clone(this).run_attempt(address.clone(), held, epoch));
        let abort = task.abort_handle();
        let outcome = async move { task.await.unwrap_or(Err(AuthError::Cancelled)) }
            .boxed()
            .shared();

        tracker.in_flight = Some(InFlight {
            address: address.clone(),
            outcome: outcome.clone(),
            abort,
        });
        outcome
    }

    fn held_token(&self, session: &Session, address: &Address) -> Option<Token> {
        if let Some(token) = session.token_for(address) {
            return Some(token.clone());
        }
        match &session.address {
            // The stored token belongs to the previous wallet.
            Some(bound) if bound != address => {
                self.clear_store();
                None
            }
            _ => match self.store.get() {
                Ok(token) => token,
                Err(err) => {
                    tracing::warn!(error = %err, "cannot read session store");
                    None
                }
            },
        }
    }

    async fn run_attempt(
        self: Arc<Self>,
        address: Address,
        held: Option<Token>,
        epoch: u64,
    ) -> Result<Token, AuthError> {
        let result = self.attempt(&address, held, epoch).await;
        self.finish(&address, epoch, result)
    }

    async fn attempt(
        &self,
        address: &Address,
        held: Option<Token>,
        epoch: u64,
    ) -> Result<Token, AuthError> {
        if let Some(token) = held {
            match self.identity.validate_token(&token).await {
                Ok(()) => {
                    tracing::debug!(%address, "held token validated");
                    return Ok(token);
                }
                Err(AuthError::TokenInvalid) => {
                    tracing::info!(%address, "held token rejected; requesting fresh challenge");
                    self.drop_held_token(address, epoch);
                }
                Err(err) => return Err(err),
            }
        }

        let challenge = self.identity.request_challenge(address).await?;

        // Last check before a human sees a prompt.
        self.ensure_current(address, epoch)?;
        tracing::info!(%address, "requesting wallet signature");
        let mut wallet_rx = self.wallet.subscribe();
        let signature = tokio::select! {
            biased;
            () = wallet_left(&mut wallet_rx, address) => {
                tracing::info!(%address, "wallet disconnected during signature prompt");
                return Err(AuthError::Cancelled);
            }
            signed = self.signer.sign(address, &challenge) => signed?,
        };

        self.ensure_current(address, epoch)?;
        self.identity
            .exchange_signature(address, &challenge, &signature)
            .await
    }

    fn ensure_current(&self, address: &Address, epoch: u64) -> Result<(), AuthError> {
        let current = self.tracker.lock().epoch == epoch;
        if current && self.wallet.current().as_ref() == Some(address) {
            Ok(())
        } else {
            Err(AuthError::Cancelled)
        }
    }

    fn drop_held_token(&self, address: &Address, epoch: u64) {
        let mut tracker = self.tracker.lock();
        if tracker.epoch != epoch {
            return;
        }
        self.clear_store();
        if tracker.session.token.is_some() {
            tracker.session = Session {
                address: Some(address.clone()),
                token: None,
                status: AuthStatus::Authenticating,
            };
            self.publish(&tracker.session);
        }
    }

    /// Applies the attempt's result unless it has been superseded.
    fn finish(
        &self,
        address: &Address,
        epoch: u64,
        result: Result<Token, AuthError>,
    ) -> Result<Token, AuthError> {
        let mut tracker = self.tracker.lock();
        if tracker.epoch != epoch {
            tracing::debug!(%address, "discarding superseded authentication result");
            return Err(AuthError::Cancelled);
        }
        tracker.in_flight = None;

        if self.wallet.current().as_ref() != Some(address) {
            tracing::info!(%address, "wallet left before authentication finished; discarding result");
            tracker.session = Session {
                address: Some(address.clone()),
                token: None,
                status: AuthStatus::Unauthenticated,
            };
            self.publish(&tracker.session);
            return Err(AuthError::Cancelled);
        }

        match &result {
            Ok(token) => {
                if let Err(err) = self.store.set(token) {
                    tracing::warn!(error = %err, "session token not persisted");
                }
                tracker.session = Session {
                    address: Some(address.clone()),
                    token: Some(token.clone()),
                    status: AuthStatus::Authenticated,
                };
                tracing::info!(%address, "authenticated");
            }
            // Re-validation could not reach the service; keep the live token.
            Err(err) if tracker.session.token.is_some() => {
                tracing::warn!(%address, error = %err, "token re-validation failed");
                return Err(err.clone());
            }
            Err(AuthError::Cancelled) => {
                tracker.session = Session {
                    address: Some(address.clone()),
                    token: None,
                    status: AuthStatus::Unauthenticated,
                };
            }
            Err(err) => {
                if matches!(err, AuthError::TokenExchange(_)) {
                    self.clear_store();
                }
                tracker.session = Session {
                    address: Some(address.clone()),
                    token: None,
                    status: AuthStatus::Failed,
                };
                tracing::warn!(%address, error = %err, "authentication failed");
            }
        }
        self.publish(&tracker.session);
        result
    }

    fn publish(&self, session: &Session) {
        self.session_tx.send_replace(session.clone());
    }

    fn clear_store(&self) {
        if let Err(err) = self.store.clear() {
            tracing::warn!(error = %err, "cannot clear session store");
        }
    }
}
