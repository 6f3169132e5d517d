//! WebSocket message types: envelope, commands, and inbound frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, NotificationEvent};
use crate::error::TransportError;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-generated ID for commands; echoed by responses and pongs.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client pushed event.
    Event,
    /// Server → Client error.
    Error,
    /// Server → Client answer to a ping.
    Pong,
}

/// Commands the client sends over the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Start receiving events for channels.
    Subscribe {
        /// Channels to subscribe to.
        channels: Vec<ChannelId>,
    },
    /// Stop receiving events for channels.
    Unsubscribe {
        /// Channels to unsubscribe from.
        channels: Vec<ChannelId>,
    },
    /// Liveness probe; the server answers with a `pong` echoing the id.
    Ping,
}

/// An encoded command ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Envelope id.
    pub id: String,
    /// JSON text.
    pub text: String,
}

impl WsCommand {
    /// Wraps the command in an envelope with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] if serialization fails.
    pub fn encode(&self) -> Result<OutboundFrame, TransportError> {
        let payload =
            serde_json::to_value(self).map_err(|e| TransportError::Send(e.to_string()))?;
        let msg = WsMessage {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: WsMessageType::Command,
            timestamp: Utc::now(),
            payload,
        };
        let text = serde_json::to_string(&msg).map_err(|e| TransportError::Send(e.to_string()))?;
        Ok(OutboundFrame { id: msg.id, text })
    }
}

/// A decoded server → client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A notification published on a subscribed channel.
    Event(NotificationEvent),
    /// Answer to the ping with this id.
    Pong {
        /// Echoed ping id.
        id: String,
    },
    /// Acknowledgement of a command.
    Response {
        /// Echoed command id.
        id: String,
        /// Response body.
        payload: serde_json::Value,
    },
    /// Server-side error for a command.
    Error {
        /// Echoed command id (may be empty).
        id: String,
        /// Human-readable message.
        message: String,
    },
}

/// Decodes a text frame.
///
/// # Errors
///
/// Returns [`TransportError::Malformed`] if the frame is not a valid
/// envelope, or an `event` frame whose payload is not a notification.
pub fn decode(text: &str) -> Result<Inbound, TransportError> {
    let msg: WsMessage =
        serde_json::from_str(text).map_err(|e| TransportError::Malformed(e.to_string()))?;
    match msg.msg_type {
        WsMessageType::Event => serde_json::from_value(msg.payload)
            .map(Inbound::Event)
            .map_err(|e| TransportError::Malformed(format!("event payload: {e}"))),
        WsMessageType::Pong => Ok(Inbound::Pong { id: msg.id }),
        WsMessageType::Response => Ok(Inbound::Response {
            id: msg.id,
            payload: msg.payload,
        }),
        WsMessageType::Error => {
            let message = msg
                .payload
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unspecified error")
                .to_string();
            Ok(Inbound::Error {
                id: msg.id,
                message,
            })
        }
        WsMessageType::Command => Err(TransportError::Malformed(
            "server sent a command frame".to_string(),
        )),
    }
}
