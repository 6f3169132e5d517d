//! Wallet connection signal and the signing seam.
//!
//! [`Wallet`] is the observable "which address is connected" signal that
//! drives the whole pipeline. [`WalletSigner`] is the wallet's signing
//! capability; a call may wait indefinitely for a human to approve.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::domain::Address;
use crate::error::AuthError;

/// Challenge text issued by the identity service for the wallet to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Challenge(pub String);

/// Wallet signature over a [`Challenge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

/// Signing capability of the connected wallet.
#[async_trait]
pub trait WalletSigner: Send + Sync + fmt::Debug {
    /// Asks the wallet to sign `challenge` on behalf of `address`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SignatureRejected`] if the user declines, or
    /// another [`AuthError`] if the wallet is unavailable.
    async fn sign(&self, address: &Address, challenge: &Challenge)
    -> Result<Signature, AuthError>;
}

/// Observable wallet connection state.
///
/// Cheap to clone; all clones share the same signal. Re-connecting the
/// same address still notifies observers, which is how a user re-offers
/// authentication after a failure.
#[derive(Clone)]
pub struct Wallet {
    sender: Arc<watch::Sender<Option<Address>>>,
}

impl Wallet {
    /// Creates a disconnected wallet signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Marks `address` as connected.
    pub fn connect(&self, address: Address) {
        tracing::info!(%address, "wallet connected");
        self.sender.send_replace(Some(address));
    }

    /// Marks the wallet as disconnected.
    pub fn disconnect(&self) {
        if self.sender.send_replace(None).is_some() {
            tracing::info!("wallet disconnected");
        }
    }

    /// Currently connected address.
    #[must_use]
    pub fn current(&self) -> Option<Address> {
        self.sender.borrow().clone()
    }

    /// Receiver notified on every connect/disconnect.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Address>> {
        self.sender.subscribe()
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("current", &self.current())
            .finish()
    }
}

/// Resolves once the wallet is no longer connected to `address`.
pub(crate) async fn wallet_left(rx: &mut watch::Receiver<Option<Address>>, address: &Address) {
    // A closed sender also means the wallet is gone.
    let _ = rx
        .wait_for(|current| current.as_ref() != Some(address))
        .await;
}
