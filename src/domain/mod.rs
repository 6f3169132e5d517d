//! Domain layer: identifiers, session model, notifications and events.
//!
//! This module contains the client-side domain model: typed identifiers,
//! the session snapshot owned by the auth controller, the notification
//! event and its bounded log, the per-channel rate limiter, and the event
//! bus used to broadcast connection lifecycle changes.

pub mod connection_event;
pub mod event_bus;
pub mod ids;
pub mod notification;
pub mod notification_log;
pub mod rate_limit;
pub mod session;

pub use connection_event::{ConnectionEvent, ConnectionStatus, DisconnectReason};
pub use event_bus::EventBus;
pub use ids::{Address, ChannelId, Token};
pub use notification::NotificationEvent;
pub use notification_log::{Insert, NotificationLog};
pub use rate_limit::RateLimiter;
pub use session::{AuthState, AuthStatus, Session};
