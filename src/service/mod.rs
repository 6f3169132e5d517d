//! Service layer: dispatch, presentation and orchestration.
//!
//! [`NotificationDispatcher`] fans inbound events out to listeners,
//! [`ToastQueue`] turns them into transient toasts, [`Coordinator`] keeps
//! auth and the push connection in line with the wallet, and
//! [`NotifyClient`] bundles everything behind one facade.

pub mod client;
pub mod coordinator;
pub mod dispatcher;
pub mod toast;

pub use client::NotifyClient;
pub use coordinator::{Coordinator, ReconnectPolicy};
pub use dispatcher::{
    DispatchOutcome, DispatchStats, DispatcherConfig, Listener, ListenerHandle,
    NotificationDispatcher,
};
pub use toast::{Toast, ToastQueue};
