//! Client error types with numeric code mapping.
//!
//! Each subsystem owns a small error enum ([`AuthError`], [`TransportError`],
//! [`StoreError`], [`ConfigError`]). [`NotifyError`] is the central error
//! type that wraps them and assigns every variant a stable numeric code.
//!
//! Nothing here is fatal to the host process: authentication and transport
//! failures resolve to session/connection states and are reported through
//! observers. Callers retry by re-triggering the same entry points.

/// Authentication failures surfaced by
/// [`crate::auth::AuthSessionController::authenticate`].
///
/// `Clone` because a single in-flight attempt resolves every caller that
/// joined it with the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No wallet is connected with the requested address.
    #[error("no wallet connected for this address")]
    NoWallet,

    /// The wallet declined to sign the challenge.
    #[error("signature request rejected by wallet")]
    SignatureRejected,

    /// The identity service refused to exchange the signature for a token.
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The held token was reported invalid or expired.
    #[error("session token invalid or expired")]
    TokenInvalid,

    /// The identity service could not be reached or answered unexpectedly.
    #[error("identity service error: {0}")]
    Identity(String),

    /// The attempt was superseded by a logout, wallet disconnect or address
    /// switch; its result was discarded.
    #[error("authentication attempt cancelled")]
    Cancelled,
}

/// Failures reported by a [`crate::ws::Transport`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The push channel could not be opened.
    #[error("cannot open push channel: {0}")]
    Open(String),

    /// The server rejected the session token during the handshake.
    #[error("push channel rejected session token")]
    Unauthorized,

    /// The push channel closed unexpectedly.
    #[error("push channel closed: {0}")]
    Closed(String),

    /// An inbound frame could not be decoded.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// An outbound frame could not be written.
    #[error("send failed: {0}")]
    Send(String),
}

/// Failures of a [`crate::store::SessionStore`] backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("session store I/O error: {0}")]
    Io(String),

    /// The backing file exists but is not a valid key/value document.
    #[error("session store corrupt: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Invalid configuration or input values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A wallet address did not match `0x` followed by 40 hex digits.
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),

    /// A channel id was empty or contained whitespace.
    #[error("invalid channel id: {0:?}")]
    InvalidChannel(String),

    /// A configuration value could not be used.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Environment variable name.
        key: &'static str,
        /// What was wrong with it.
        message: String,
    },
}

/// Central client error.
///
/// # Error Code Ranges
///
/// | Range     | Category       |
/// |-----------|----------------|
/// | 1000–1999 | Configuration  |
/// | 2000–2999 | Authentication |
/// | 3000–3999 | Transport      |
/// | 4000–4999 | Storage        |
/// | 5000–5999 | Client         |
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    /// Invalid configuration or input.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Authentication failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Session store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// [`crate::service::NotifyClient::run`] was called while another run
    /// was still active.
    #[error("client is already running")]
    AlreadyRunning,
}

impl NotifyError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Config(ConfigError::InvalidAddress(_)) => 1001,
            Self::Config(ConfigError::InvalidChannel(_)) => 1002,
            Self::Config(ConfigError::InvalidValue { .. }) => 1003,
            Self::Auth(AuthError::NoWallet) => 2001,
            Self::Auth(AuthError::SignatureRejected) => 2002,
            Self::Auth(AuthError::TokenExchange(_)) => 2003,
            Self::Auth(AuthError::TokenInvalid) => 2004,
            Self::Auth(AuthError::Identity(_)) => 2005,
            Self::Auth(AuthError::Cancelled) => 2006,
            Self::Transport(TransportError::Open(_)) => 3001,
            Self::Transport(TransportError::Unauthorized) => 3002,
            Self::Transport(TransportError::Closed(_)) => 3003,
            Self::Transport(TransportError::Malformed(_)) => 3004,
            Self::Transport(TransportError::Send(_)) => 3005,
            Self::Store(StoreError::Io(_)) => 4001,
            Self::Store(StoreError::Corrupt(_)) => 4002,
            Self::AlreadyRunning => 5001,
        }
    }

    /// Returns `true` when re-triggering the same entry point may succeed.
    ///
    /// Configuration errors need operator action; a second concurrent run
    /// never succeeds.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::AlreadyRunning)
    }
}
