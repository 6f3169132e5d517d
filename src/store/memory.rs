//! In-memory [`SessionStore`], used by tests and ephemeral clients.

use parking_lot::Mutex;

use super::SessionStore;
use crate::domain::Token;
use crate::error::StoreError;

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    token: Mutex<Option<Token>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `token`.
    #[must_use]
    pub fn with_token(token: Token) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Result<Option<Token>, StoreError> {
        Ok(self.token.lock().clone())
    }

    fn set(&self, token: &Token) -> Result<(), StoreError> {
        *self.token.lock() = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.token.lock() = None;
        Ok(())
    }
}
