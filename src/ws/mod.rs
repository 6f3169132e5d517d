//! WebSocket layer: transport, wire messages, subscriptions and the
//! connection manager.
//!
//! The push channel is a single WebSocket per client. Features subscribe to
//! named channels through the [`ConnectionManager`], which reference-counts
//! them and replays the live set after every reconnect.

pub mod manager;
pub mod messages;
pub mod subscription;
pub mod transport;

pub use manager::{ConnectionManager, InboundEvents, Liveness};
pub use messages::{Inbound, WsCommand, WsMessage, WsMessageType};
pub use subscription::SubscriptionRegistry;
pub use transport::{Transport, TransportConnection, WsTransport};
