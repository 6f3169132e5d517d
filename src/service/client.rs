//! `NotifyClient`: the surface UI features talk to.
//!
//! Owns one instance of every component and wires them together: the
//! toast queue listens to the dispatcher, the dispatcher drains the
//! connection manager's inbound stream, and the coordinator drives auth and
//! connection from the wallet signal while [`NotifyClient::run`] is active.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use super::coordinator::Coordinator;
use super::dispatcher::{DispatchStats, ListenerHandle, NotificationDispatcher};
use super::toast::{Toast, ToastQueue};
use crate::auth::{AuthSessionController, IdentityProvider, Wallet, WalletSigner};
use crate::config::NotifyConfig;
use crate::domain::{AuthState, ChannelId, ConnectionStatus, NotificationEvent, Token};
use crate::error::{AuthError, NotifyError};
use crate::store::SessionStore;
use crate::ws::{ConnectionManager, InboundEvents, Transport};

/// Single entry point for wallet auth, the push channel and notifications.
#[derive(Debug)]
pub struct NotifyClient {
    wallet: Wallet,
    auth: AuthSessionController,
    connection: ConnectionManager,
    dispatcher: NotificationDispatcher,
    toasts: ToastQueue,
    toast_listener: Mutex<Option<ListenerHandle>>,
    // Taken while `run` is active.
    inbound: Mutex<Option<InboundEvents>>,
    config: NotifyConfig,
}

impl NotifyClient {
    /// Builds a client from its external collaborators.
    #[must_use]
    pub fn new(
        config: &NotifyConfig,
        identity: Arc<dyn IdentityProvider>,
        signer: Arc<dyn WalletSigner>,
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let wallet = Wallet::new();
        let auth = AuthSessionController::new(identity, signer, store, wallet.clone());
        let connection = ConnectionManager::new(transport, config.push_url.clone());
        let dispatcher = NotificationDispatcher::new(&config.dispatcher());
        let toasts = ToastQueue::new(config.toast_ttl, config.toast_max_visible);
        let toast_listener = toasts.attach(&dispatcher);
        let inbound = connection.take_events();
        Self {
            wallet,
            auth,
            connection,
            dispatcher,
            toasts,
            toast_listener: Mutex::new(Some(toast_listener)),
            inbound: Mutex::new(inbound),
            config: config.clone(),
        }
    }

    /// Runs the client until `shutdown` resolves.
    ///
    /// Dispatches inbound notifications and drives the coordinator loop. On
    /// return the push connection is closed and pending toast timers are
    /// stopped; the session (and its persisted token) is kept, so the client
    /// can be run again.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::AlreadyRunning`] if another `run` is active.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), NotifyError>
    where
        F: Future<Output = ()>,
    {
        let Some(mut events) = self.inbound.lock().take() else {
            tracing::warn!("run called while the client is already running");
            return Err(NotifyError::AlreadyRunning);
        };

        let coordinator = Coordinator::new(
            self.auth.clone(),
            self.connection.clone(),
            self.config.reconnect_policy(),
            self.config.ping_interval,
        );
        let coordinated = coordinator.run(shutdown);
        tokio::pin!(coordinated);
        tokio::select! {
            () = &mut coordinated => {}
            () = self.dispatcher.run(&mut events) => coordinated.await,
        }

        *self.inbound.lock() = Some(events);
        self.toasts.clear();
        Ok(())
    }

    /// The wallet signal. Connect or disconnect it to drive the client.
    #[must_use]
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Current authentication state.
    #[must_use]
    pub fn auth_state(&self) -> AuthState {
        self.auth.auth_state()
    }

    /// Current push connection status.
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Authenticates the connected wallet now, e.g. to retry after a
    /// rejected signature.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Auth`] with [`AuthError::NoWallet`] without a
    /// connected wallet, or with the attempt's failure.
    pub async fn authenticate(&self) -> Result<Token, NotifyError> {
        let Some(address) = self.wallet.current() else {
            return Err(AuthError::NoWallet.into());
        };
        Ok(self.auth.authenticate(&address).await?)
    }

    /// Disconnects the wallet and forgets the session.
    pub fn logout(&self) {
        self.wallet.disconnect();
        self.auth.clear();
        self.connection.disconnect();
        self.toasts.clear();
    }

    /// Adds a reference to `channel`.
    pub fn subscribe(&self, channel: ChannelId) {
        self.connection.subscribe(channel);
    }

    /// Drops a reference to `channel`.
    pub fn unsubscribe(&self, channel: &ChannelId) {
        self.connection.unsubscribe(channel);
    }

    /// Registers a notification listener.
    pub fn on_notification<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.dispatcher.on_notification(listener)
    }

    /// Recent notifications, newest first.
    #[must_use]
    pub fn latest_notifications(&self) -> Vec<NotificationEvent> {
        self.dispatcher.latest()
    }

    /// Removes a notification from the recent list.
    pub fn dismiss(&self, id: &str) -> bool {
        self.dispatcher.dismiss(id)
    }

    /// Visible toasts, newest first.
    #[must_use]
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.visible()
    }

    /// Hides a toast early.
    pub fn dismiss_toast(&self, id: &str) -> bool {
        self.toasts.dismiss(id)
    }

    /// Stops feeding new notifications into toasts.
    pub fn disable_toasts(&self) {
        if let Some(handle) = self.toast_listener.lock().take() {
            handle.unsubscribe();
        }
        self.toasts.clear();
    }

    /// Dispatcher counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// The connection manager, for status and liveness observation.
    #[must_use]
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// The auth controller, for session observation.
    #[must_use]
    pub fn auth(&self) -> &AuthSessionController {
        &self.auth
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::oneshot;

    use crate::domain::{AuthStatus, ConnectionEvent};
    use crate::store::MemorySessionStore;
    use crate::test_support::{
        MockIdentity, MockSigner, MockTransport, address, channel, eventually, wait_status,
    };

    struct Running {
        client: Arc<NotifyClient>,
        transport: Arc<MockTransport>,
        signer: Arc<MockSigner>,
        stop: oneshot::Sender<()>,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(config: &NotifyConfig) -> Running {
        let transport = Arc::new(MockTransport::new());
        let signer = Arc::new(MockSigner::approving());
        let client = Arc::new(NotifyClient::new(
            config,
            Arc::new(MockIdentity::new()),
            Arc::clone(&signer) as Arc<dyn WalletSigner>,
            Arc::new(MemorySessionStore::new()),
            Arc::clone(&transport) as Arc<dyn Transport>,
        ));
        let (stop, stopped) = oneshot::channel::<()>();
        let runner = Arc::clone(&client);
        let task = tokio::spawn(async move {
            let outcome = runner
                .run(async move {
                    let _ = stopped.await;
                })
                .await;
            assert!(outcome.is_ok());
        });
        Running {
            client,
            transport,
            signer,
            stop,
            task,
        }
    }

    impl Running {
        async fn wait_connected(&self) -> bool {
            let mut status = self.client.connection().watch_status();
            wait_status(&mut status, ConnectionStatus::Connected).await
        }

        async fn stop(self) {
            let _ = self.stop.send(());
            assert!(self.task.await.is_ok());
        }
    }

    #[tokio::test]
    async fn wallet_to_notification_end_to_end() {
        let running = start(&NotifyConfig::default());
        let client = &running.client;
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let _listener = client.on_notification(move |e| sink.lock().push(e.id.clone()));

        client.subscribe(channel("events:global"));
        client.wallet().connect(address('a'));
        assert!(running.wait_connected().await);
        assert_eq!(client.auth_state().status, AuthStatus::Authenticated);
        assert_eq!(running.signer.calls(), 1);
        assert!(eventually(|| running.transport.subscribed_channels().len() == 1).await);

        running.transport.push_event("e1", "events:global", "transfer");
        assert!(eventually(|| received.lock().len() == 1).await);

        let ids: Vec<String> = client.latest_notifications().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["e1"]);
        assert_eq!(client.toasts().len(), 1);
        running.stop().await;
    }

    #[tokio::test]
    async fn retransmission_after_reconnect_is_deduplicated() {
        let config = NotifyConfig {
            reconnect_base: Duration::from_millis(1),
            reconnect_max: Duration::from_millis(5),
            ..NotifyConfig::default()
        };
        let running = start(&config);
        let client = &running.client;
        client.subscribe(channel("events:global"));
        client.wallet().connect(address('a'));
        assert!(running.wait_connected().await);

        running.transport.push_event("e1", "events:global", "transfer");
        assert!(eventually(|| client.latest_notifications().len() == 1).await);

        let mut events = client.connection().events();
        running.transport.drop_link("network reset");
        let Ok(ConnectionEvent::Disconnected { .. }) = events.recv().await else {
            panic!("expected disconnect");
        };
        let Ok(ConnectionEvent::Connected) = events.recv().await else {
            panic!("expected reconnect");
        };

        running.transport.push_event("e1", "events:global", "transfer");
        running.transport.push_event("e2", "events:global", "transfer");
        assert!(eventually(|| client.latest_notifications().len() == 2).await);
        assert_eq!(client.stats().duplicates, 1);
        running.stop().await;
    }

    #[tokio::test]
    async fn logout_disconnects_and_forgets() {
        let running = start(&NotifyConfig::default());
        let client = &running.client;
        client.wallet().connect(address('a'));
        assert!(running.wait_connected().await);

        client.logout();
        assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);
        assert_eq!(client.auth_state(), AuthState::default());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(running.signer.calls(), 1);
        running.stop().await;
    }

    #[tokio::test]
    async fn authenticate_without_wallet_fails() {
        let running = start(&NotifyConfig::default());
        let result = running.client.authenticate().await;
        let Err(err) = result else {
            panic!("authentication needs a wallet");
        };
        assert!(matches!(err, NotifyError::Auth(AuthError::NoWallet)));
        assert_eq!(err.error_code(), 2001);
        running.stop().await;
    }

    #[tokio::test]
    async fn second_concurrent_run_is_refused() {
        let running = start(&NotifyConfig::default());
        assert!(eventually(|| running.client.inbound.lock().is_none()).await);

        let second = running.client.run(std::future::ready(())).await;
        assert!(matches!(second, Err(NotifyError::AlreadyRunning)));
        running.stop().await;
    }

    #[tokio::test]
    async fn client_can_run_again_after_stopping() {
        let running = start(&NotifyConfig::default());
        let client = Arc::clone(&running.client);
        let transport = Arc::clone(&running.transport);
        client.wallet().connect(address('a'));
        assert!(running.wait_connected().await);
        running.stop().await;
        assert_eq!(client.connection_status(), ConnectionStatus::Disconnected);

        let (stop, stopped) = oneshot::channel::<()>();
        let runner = Arc::clone(&client);
        let task = tokio::spawn(async move {
            runner
                .run(async move {
                    let _ = stopped.await;
                })
                .await
        });
        let mut status = client.connection().watch_status();
        assert!(wait_status(&mut status, ConnectionStatus::Connected).await);

        transport.push_event("e1", "events:global", "transfer");
        assert!(eventually(|| client.latest_notifications().len() == 1).await);

        let _ = stop.send(());
        let Ok(outcome) = task.await else {
            panic!("run task panicked");
        };
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn disabled_toasts_stop_collecting() {
        let running = start(&NotifyConfig::default());
        let client = &running.client;
        client.disable_toasts();
        client.wallet().connect(address('a'));
        assert!(running.wait_connected().await);

        running.transport.push_event("e1", "events:global", "transfer");
        assert!(eventually(|| client.latest_notifications().len() == 1).await);
        assert!(client.toasts().is_empty());
        running.stop().await;
    }
}
