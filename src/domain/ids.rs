//! Type-safe identifiers: wallet [`Address`], session [`Token`] and
//! push [`ChannelId`].
//!
//! Newtypes keep the three string-shaped values from being confused with
//! each other and centralise their validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Wallet address: `0x` followed by 40 hex digits, stored lower-case.
///
/// Two addresses that differ only in checksum casing compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parses and normalises a wallet address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if the input is not `0x`
    /// followed by exactly 40 hex digits.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| ConfigError::InvalidAddress(input.to_string()))?;
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ConfigError::InvalidAddress(input.to_string()));
        }
        Ok(Self(format!("0x{}", hex.to_ascii_lowercase())))
    }

    /// Returns the normalised address string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

/// Opaque session token issued by the identity service.
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw token, e.g. for an `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(***{})", self.0.len())
    }
}

/// Named topic on the push connection, e.g. `events:global`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Validates a channel name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidChannel`] for empty names or names
    /// containing whitespace.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidChannel(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// The broadcast channel every client listens on by default.
    #[must_use]
    pub fn global() -> Self {
        Self("events:global".to_string())
    }

    /// Returns the channel name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChannelId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn address_normalises_case() {
        let upper = Address::parse("0xABCDEF0123456789ABCDEF0123456789ABCDEF01");
        let lower = Address::parse("0xabcdef0123456789abcdef0123456789abcdef01");
        let (Ok(upper), Ok(lower)) = (upper, lower) else {
            panic!("valid addresses");
        };
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn address_rejects_bad_input() {
        assert!(Address::parse("abcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("0xzzcdef0123456789abcdef0123456789abcdef01").is_err());
    }

    #[test]
    fn address_deserialize_validates() {
        let ok: Result<Address, _> =
            serde_json::from_str("\"0x00000000000000000000000000000000000000aa\"");
        assert!(ok.is_ok());
        let bad: Result<Address, _> = serde_json::from_str("\"not-an-address\"");
        assert!(bad.is_err());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = Token::new("secret-value");
        let printed = format!("{token:?}");
        assert!(!printed.contains("secret"));
        assert_eq!(token.expose(), "secret-value");
    }

    #[test]
    fn channel_rejects_empty_and_whitespace() {
        assert!(ChannelId::parse("").is_err());
        assert!(ChannelId::parse("events global").is_err());
        let Ok(id) = ChannelId::parse("events:global") else {
            panic!("valid channel");
        };
        assert_eq!(id.to_string(), "events:global");
    }
}
