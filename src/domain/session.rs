//! The authenticated identity + token pairing for one wallet address.

use serde::Serialize;

use super::{Address, Token};

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    /// No token is held.
    #[default]
    Unauthenticated,
    /// A challenge/signature exchange (or token validation) is in flight.
    Authenticating,
    /// A validated token is held.
    Authenticated,
    /// The last attempt failed; waiting for the next trigger.
    Failed,
}

/// Session snapshot published by the auth controller.
///
/// Invariant: `token.is_some()` implies `status == Authenticated`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Wallet address the session is bound to.
    pub address: Option<Address>,
    /// Current session token.
    pub token: Option<Token>,
    /// Lifecycle status.
    pub status: AuthStatus,
}

impl Session {
    /// Returns the token if the session is authenticated for `address`.
    #[must_use]
    pub fn token_for(&self, address: &Address) -> Option<&Token> {
        match (&self.address, &self.token, self.status) {
            (Some(bound), Some(token), AuthStatus::Authenticated) if bound == address => {
                Some(token)
            }
            _ => None,
        }
    }

    /// Returns `true` if the session is bound to `address`.
    #[must_use]
    pub fn is_bound_to(&self, address: &Address) -> bool {
        self.address.as_ref() == Some(address)
    }

    /// UI-facing view without the token.
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            address: self.address.clone(),
            status: self.status,
        }
    }
}

/// Public authentication state exposed to UI features.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthState {
    /// Bound wallet address, if any.
    pub address: Option<Address>,
    /// Lifecycle status.
    pub status: AuthStatus,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn addr(last: char) -> Address {
        let Ok(a) = Address::parse(&format!("0x{}", last.to_string().repeat(40))) else {
            panic!("valid address");
        };
        a
    }

    #[test]
    fn token_for_requires_matching_authenticated_session() {
        let session = Session {
            address: Some(addr('a')),
            token: Some(Token::new("tok-1")),
            status: AuthStatus::Authenticated,
        };
        assert_eq!(session.token_for(&addr('a')), Some(&Token::new("tok-1")));
        assert_eq!(session.token_for(&addr('b')), None);

        let pending = Session {
            status: AuthStatus::Authenticating,
            ..session
        };
        assert_eq!(pending.token_for(&addr('a')), None);
    }

    #[test]
    fn default_is_unauthenticated() {
        let session = Session::default();
        assert_eq!(session.status, AuthStatus::Unauthenticated);
        assert!(session.auth_state().address.is_none());
    }
}
