//! # hydra-notify
//!
//! Wallet-authenticated, real-time notification client for the hydra
//! gateway.
//!
//! A connected wallet is turned into a session token through a one-time
//! challenge/signature exchange. The token opens a single WebSocket push
//! connection shared by every feature; features subscribe to named channels
//! on it and receive deduplicated notifications through one dispatcher.
//!
//! ## Architecture
//!
//! ```text
//! Wallet signal
//!     │
//!     ├── AuthSessionController (auth/) ── IdentityProvider, WalletSigner
//!     │       │                            SessionStore (store/)
//!     │       └── Session (watch)
//!     │
//!     ├── Coordinator (service/) ── reconcile, backoff, ping cadence
//!     │
//!     ├── ConnectionManager (ws/) ── Transport (WebSocket)
//!     │       ├── ConnectionEvent bus (domain/)
//!     │       └── inbound NotificationEvent stream
//!     │
//!     └── NotificationDispatcher (service/)
//!             ├── NotificationLog + RateLimiter (domain/)
//!             ├── listeners
//!             └── ToastQueue
//! ```
//!
//! [`service::NotifyClient`] bundles all of the above behind one facade.

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod store;
pub mod ws;

#[cfg(test)]
mod test_support;
