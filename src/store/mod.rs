//! Session store: synchronous get/set/clear of the session token.
//!
//! Provides the [`SessionStore`] trait plus two backends: an in-memory
//! store and a JSON file store. Both keep one opaque token string under
//! [`SESSION_TOKEN_KEY`]; an absent key means unauthenticated.

pub mod file;
pub mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

use crate::domain::Token;
use crate::error::StoreError;

/// Well-known key the session token is persisted under.
pub const SESSION_TOKEN_KEY: &str = "hydra_notify.session_token";

/// Synchronous token persistence.
///
/// Written only by the auth controller; the rest of the client observes
/// the session through the controller instead of reading the store.
pub trait SessionStore: Send + Sync + std::fmt::Debug {
    /// Returns the stored token, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backend cannot be read.
    fn get(&self) -> Result<Option<Token>, StoreError>;

    /// Replaces the stored token.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backend cannot be written.
    fn set(&self, token: &Token) -> Result<(), StoreError>;

    /// Removes the stored token. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backend cannot be written.
    fn clear(&self) -> Result<(), StoreError>;
}
