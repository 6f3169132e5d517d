//! Authentication layer: wallet signal, identity collaborator and the
//! session controller.
//!
//! The controller turns a connected wallet address into a session token
//! with a one-time challenge/signature exchange, and re-validates held
//! tokens instead of prompting again.

pub mod controller;
pub mod identity;
pub mod wallet;

pub use controller::AuthSessionController;
pub use identity::{HttpIdentityClient, IdentityProvider};
pub use wallet::{Challenge, Signature, Wallet, WalletSigner};
