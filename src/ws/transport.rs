//! Transport seam for the push channel, and its WebSocket implementation.
//!
//! The connection manager only sees [`Transport`] and
//! [`TransportConnection`]; [`WsTransport`] provides them over
//! `tokio-tungstenite` with the session token as a bearer credential.

use std::fmt;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::domain::Token;
use crate::error::TransportError;

/// Opens push-channel connections.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Opens a connection to `url` authenticated with `token`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unauthorized`] if the server rejects the
    /// token, or [`TransportError::Open`] for any other failure.
    async fn open(
        &self,
        url: &str,
        token: &Token,
    ) -> Result<Box<dyn TransportConnection>, TransportError>;
}

/// One open push-channel connection carrying text frames.
#[async_trait]
pub trait TransportConnection: Send + fmt::Debug {
    /// Writes a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] if the frame cannot be written.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Waits for the next text frame. Must be cancel-safe: the manager
    /// polls it inside `tokio::select!`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the connection is gone.
    async fn recv(&mut self) -> Result<String, TransportError>;

    /// Closes the connection. Errors during close are ignored.
    async fn close(&mut self);
}

/// [`Transport`] over WebSocket (`ws://` or `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    /// Creates the transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(
        &self,
        url: &str,
        token: &Token,
    ) -> Result<Box<dyn TransportConnection>, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Open(format!("invalid URL: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|e| TransportError::Open(format!("invalid token header: {e}")))?;
        request.headers_mut().insert("Authorization", bearer);

        tracing::debug!(url, "opening push channel");
        let (stream, _) = connect_async(request).await.map_err(|e| match e {
            WsError::Http(response)
                if matches!(
                    response.status(),
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
                ) =>
            {
                TransportError::Unauthorized
            }
            other => TransportError::Open(other.to_string()),
        })?;
        Ok(Box::new(WsConnection { stream }))
    }
}

/// A WebSocket opened by [`WsTransport`].
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl TransportConnection for WsConnection {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_string()),
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                    return Err(TransportError::Closed(reason));
                }
                // tungstenite answers pings itself; binary frames are not part
                // of the protocol.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(TransportError::Closed(e.to_string())),
                None => return Err(TransportError::Closed("stream ended".to_string())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "error while closing push channel");
        }
    }
}
