//! Connection lifecycle events published by the connection manager.

use std::fmt;

use serde::Serialize;

/// Status of the single push connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No transport is open or being opened.
    #[default]
    Disconnected,
    /// The transport handshake is in progress.
    Connecting,
    /// The transport is open and channel traffic flows.
    Connected,
}

/// Why the connection went to [`ConnectionStatus::Disconnected`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DisconnectReason {
    /// The caller asked for it.
    Requested,
    /// A connect with a different token replaced the link.
    TokenChanged,
    /// The transport could not be opened.
    OpenFailed(String),
    /// The server rejected the session token.
    Unauthorized,
    /// The transport closed or failed while open.
    Closed(String),
    /// An inbound frame could not be decoded.
    Malformed(String),
}

impl DisconnectReason {
    /// Returns `true` for reasons the caller did not initiate, i.e. ones a
    /// reconnect policy should react to.
    #[must_use]
    pub const fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::OpenFailed(_) | Self::Closed(_) | Self::Malformed(_)
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("disconnect requested"),
            Self::TokenChanged => f.write_str("session token changed"),
            Self::OpenFailed(detail) => write!(f, "open failed: {detail}"),
            Self::Unauthorized => f.write_str("session token rejected"),
            Self::Closed(detail) => write!(f, "connection closed: {detail}"),
            Self::Malformed(detail) => write!(f, "malformed frame: {detail}"),
        }
    }
}

/// Event delivered to connect/disconnect listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// The transport opened and subscriptions were replayed.
    Connected,
    /// The transport closed or failed to open.
    Disconnected {
        /// Why it happened.
        reason: DisconnectReason,
    },
}
