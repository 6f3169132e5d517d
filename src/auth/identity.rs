//! Identity collaborator: challenge issuance, signature exchange and
//! token validation.
//!
//! [`IdentityProvider`] is the seam the auth controller talks to.
//! [`HttpIdentityClient`] implements it against the gateway's JSON API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{Challenge, Signature};
use crate::domain::{Address, Token};
use crate::error::{AuthError, ConfigError};

/// Remote identity service.
#[async_trait]
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// Requests a signable challenge for `address`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Identity`] if the service is unavailable.
    async fn request_challenge(&self, address: &Address) -> Result<Challenge, AuthError>;

    /// Exchanges a signed challenge for a session token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenExchange`] if the service refuses the
    /// signature, or [`AuthError::Identity`] if it is unavailable.
    async fn exchange_signature(
        &self,
        address: &Address,
        challenge: &Challenge,
        signature: &Signature,
    ) -> Result<Token, AuthError>;

    /// Checks that `token` is still accepted.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenInvalid`] if the service rejects the token,
    /// or [`AuthError::Identity`] if validity cannot be determined.
    async fn validate_token(&self, token: &Token) -> Result<(), AuthError>;
}

#[derive(Debug, Serialize)]
struct ChallengeRequest<'a> {
    address: &'a Address,
}

#[derive(Debug, Deserialize)]
struct ChallengeResponse {
    challenge: Challenge,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    address: &'a Address,
    challenge: &'a Challenge,
    signature: &'a Signature,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Token,
}

/// [`IdentityProvider`] over HTTP + JSON.
///
/// - `POST {base}/auth/challenge` `{address}` → `{challenge}`
/// - `POST {base}/auth/token` `{address, challenge, signature}` → `{token}`
/// - `GET {base}/auth/validate` with bearer token → 2xx valid, 401/403 invalid
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpIdentityClient {
    /// Creates a client for the service rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "IDENTITY_URL",
                message: e.to_string(),
            })?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn unavailable(err: &reqwest::Error) -> AuthError {
    AuthError::Identity(err.to_string())
}

#[async_trait]
impl IdentityProvider for HttpIdentityClient {
    async fn request_challenge(&self, address: &Address) -> Result<Challenge, AuthError> {
        let response = self
            .http
            .post(self.endpoint("/auth/challenge"))
            .json(&ChallengeRequest { address })
            .send()
            .await
            .map_err(|e| unavailable(&e))?;
        if !response.status().is_success() {
            return Err(AuthError::Identity(format!(
                "challenge request returned {}",
                response.status()
            )));
        }
        let body: ChallengeResponse = response.json().await.map_err(|e| unavailable(&e))?;
        tracing::debug!(%address, "challenge issued");
        Ok(body.challenge)
    }

    async fn exchange_signature(
        &self,
        address: &Address,
        challenge: &Challenge,
        signature: &Signature,
    ) -> Result<Token, AuthError> {
        let response = self
            .http
            .post(self.endpoint("/auth/token"))
            .json(&TokenRequest {
                address,
                challenge,
                signature,
            })
            .send()
            .await
            .map_err(|e| unavailable(&e))?;
        let status = response.status();
        if status.is_client_error() {
            return Err(AuthError::TokenExchange(format!("server returned {status}")));
        }
        if !status.is_success() {
            return Err(AuthError::Identity(format!(
                "token exchange returned {status}"
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchange(e.to_string()))?;
        Ok(body.token)
    }

    async fn validate_token(&self, token: &Token) -> Result<(), AuthError> {
        let response = self
            .http
            .get(self.endpoint("/auth/validate"))
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| unavailable(&e))?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::TokenInvalid),
            other => Err(AuthError::Identity(format!(
                "token validation returned {other}"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpIdentityClient::new("http://localhost:3000/", Duration::from_secs(1));
        let Ok(client) = client else {
            panic!("client should build");
        };
        assert_eq!(
            client.endpoint("/auth/challenge"),
            "http://localhost:3000/auth/challenge"
        );
    }

    #[test]
    fn token_request_serializes_flat_strings() {
        let Ok(address) = Address::parse("0x2222222222222222222222222222222222222222") else {
            panic!("valid address");
        };
        let body = TokenRequest {
            address: &address,
            challenge: &Challenge("sign me".to_string()),
            signature: &Signature("0xsig".to_string()),
        };
        let json = serde_json::to_value(&body).unwrap_or_default();
        assert_eq!(json.get("challenge"), Some(&serde_json::json!("sign me")));
        assert_eq!(json.get("signature"), Some(&serde_json::json!("0xsig")));
        assert_eq!(
            json.get("address"),
            Some(&serde_json::json!("0x2222222222222222222222222222222222222222"))
        );
    }
}
