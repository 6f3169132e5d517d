//! In-process fakes shared by unit tests.

#![allow(clippy::panic)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::auth::{Challenge, IdentityProvider, Signature, WalletSigner};
use crate::domain::{Address, ChannelId, ConnectionStatus, NotificationEvent, Token};
use crate::error::{AuthError, TransportError};
use crate::ws::{Transport, TransportConnection, WsCommand, WsMessage, WsMessageType};

pub(crate) fn address(c: char) -> Address {
    let Ok(address) = Address::parse(&format!("0x{}", c.to_string().repeat(40))) else {
        panic!("invalid test address char {c}");
    };
    address
}

pub(crate) fn channel(name: &str) -> ChannelId {
    let Ok(channel) = ChannelId::parse(name) else {
        panic!("invalid test channel {name}");
    };
    channel
}

pub(crate) fn event(id: &str, channel_name: &str) -> NotificationEvent {
    NotificationEvent::new(id, channel(channel_name), "transfer")
}

/// Polls `condition` while letting spawned tasks run.
pub(crate) async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}

pub(crate) async fn wait_status(
    rx: &mut watch::Receiver<ConnectionStatus>,
    expected: ConnectionStatus,
) -> bool {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == expected))
        .await
        .is_ok_and(|r| r.is_ok())
}

// ---------------------------------------------------------------------------
// Identity

#[derive(Debug, Default)]
pub(crate) struct MockIdentity {
    challenges: AtomicUsize,
    exchanges: AtomicUsize,
    validations: AtomicUsize,
    fail_exchange: AtomicBool,
    valid_tokens: Mutex<HashSet<String>>,
    exchange_gate: Mutex<Option<watch::Sender<bool>>>,
}

impl MockIdentity {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn accept_token(&self, token: &str) {
        self.valid_tokens.lock().insert(token.to_string());
    }

    pub(crate) fn fail_exchange(&self, fail: bool) {
        self.fail_exchange.store(fail, Ordering::SeqCst);
    }

    /// Holds every exchange open until [`release_exchange`](Self::release_exchange).
    pub(crate) fn hold_exchange(&self) {
        let (gate, _) = watch::channel(false);
        *self.exchange_gate.lock() = Some(gate);
    }

    pub(crate) fn release_exchange(&self) {
        if let Some(gate) = self.exchange_gate.lock().as_ref() {
            gate.send_replace(true);
        }
    }

    pub(crate) fn challenges(&self) -> usize {
        self.challenges.load(Ordering::SeqCst)
    }

    pub(crate) fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub(crate) fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn request_challenge(&self, address: &Address) -> Result<Challenge, AuthError> {
        let n = self.challenges.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Challenge(format!("sign-in {address} #{n}")))
    }

    async fn exchange_signature(
        &self,
        _address: &Address,
        _challenge: &Challenge,
        _signature: &Signature,
    ) -> Result<Token, AuthError> {
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(AuthError::TokenExchange("signature not accepted".to_string()));
        }
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = self.exchange_gate.lock().as_ref().map(watch::Sender::subscribe);
        if let Some(mut gate) = gate
            && gate.wait_for(|open| *open).await.is_err()
        {
            return Err(AuthError::Identity("exchange gate dropped".to_string()));
        }
        let token = format!("tok-{n}");
        self.valid_tokens.lock().insert(token.clone());
        Ok(Token::new(token))
    }

    async fn validate_token(&self, token: &Token) -> Result<(), AuthError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        if self.valid_tokens.lock().contains(token.expose()) {
            Ok(())
        } else {
            Err(AuthError::TokenInvalid)
        }
    }
}

// ---------------------------------------------------------------------------
// Signer

#[derive(Debug)]
pub(crate) struct MockSigner {
    calls: AtomicUsize,
    approve: AtomicBool,
    gate: Option<watch::Sender<bool>>,
}

impl MockSigner {
    pub(crate) fn approving() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            approve: AtomicBool::new(true),
            gate: None,
        }
    }

    pub(crate) fn rejecting() -> Self {
        Self {
            approve: AtomicBool::new(false),
            ..Self::approving()
        }
    }

    /// Approves, but only once [`release`](Self::release) is called.
    pub(crate) fn gated() -> Self {
        let (gate, _) = watch::channel(false);
        Self {
            gate: Some(gate),
            ..Self::approving()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.send_replace(true);
        }
    }

    pub(crate) fn set_approve(&self, approve: bool) {
        self.approve.store(approve, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletSigner for MockSigner {
    async fn sign(
        &self,
        address: &Address,
        challenge: &Challenge,
    ) -> Result<Signature, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let mut rx = gate.subscribe();
            if rx.wait_for(|open| *open).await.is_err() {
                return Err(AuthError::SignatureRejected);
            }
        }
        if self.approve.load(Ordering::SeqCst) {
            Ok(Signature(format!("sig({address},{})", challenge.0)))
        } else {
            Err(AuthError::SignatureRejected)
        }
    }
}

// ---------------------------------------------------------------------------
// Transport

#[derive(Debug)]
struct MockLink {
    token: Token,
    sent: Vec<String>,
    closed: bool,
    inbound: mpsc::UnboundedSender<Result<String, TransportError>>,
}

#[derive(Debug, Default)]
struct TransportState {
    links: Vec<MockLink>,
    attempts: Vec<Token>,
    fail_next: Option<TransportError>,
}

/// Records every frame the manager writes and lets tests push frames back.
#[derive(Debug)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<TransportState>>,
    gate: watch::Sender<bool>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(TransportState::default())),
            gate,
        }
    }

    pub(crate) fn opened_tokens(&self) -> Vec<Token> {
        self.state.lock().links.iter().map(|l| l.token.clone()).collect()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.state.lock().attempts.len()
    }

    pub(crate) fn fail_next_open(&self, err: TransportError) {
        self.state.lock().fail_next = Some(err);
    }

    /// Makes subsequent opens wait until [`release_opens`](Self::release_opens).
    pub(crate) fn hold_opens(&self) {
        self.gate.send_replace(false);
    }

    pub(crate) fn release_opens(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn sent_commands(&self) -> Vec<WsCommand> {
        self.state
            .lock()
            .links
            .iter()
            .flat_map(|l| l.sent.iter().map(|text| parse_command(text)))
            .collect()
    }

    pub(crate) fn sent_on(&self, idx: usize) -> Vec<WsCommand> {
        self.state
            .lock()
            .links
            .get(idx)
            .map(|l| l.sent.iter().map(|text| parse_command(text)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn subscribed_channels(&self) -> Vec<ChannelId> {
        self.sent_commands()
            .into_iter()
            .flat_map(|command| match command {
                WsCommand::Subscribe { channels } => channels,
                _ => Vec::new(),
            })
            .collect()
    }

    pub(crate) fn last_ping_id(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .links
            .iter()
            .flat_map(|l| l.sent.iter())
            .filter_map(|text| {
                let msg: WsMessage = serde_json::from_str(text).ok()?;
                let command: WsCommand = serde_json::from_value(msg.payload).ok()?;
                (command == WsCommand::Ping).then_some(msg.id)
            })
            .last()
    }

    pub(crate) fn clear_sent(&self) {
        for link in &mut self.state.lock().links {
            link.sent.clear();
        }
    }

    pub(crate) fn is_closed(&self, idx: usize) -> bool {
        self.state.lock().links.get(idx).is_some_and(|l| l.closed)
    }

    pub(crate) fn push_frame(&self, text: &str) {
        self.push(Ok(text.to_string()));
    }

    pub(crate) fn push_event(&self, id: &str, channel_name: &str, kind: &str) {
        let payload = NotificationEvent::new(id, channel(channel_name), kind);
        self.push_message(
            uuid::Uuid::new_v4().to_string(),
            WsMessageType::Event,
            serde_json::to_value(payload).unwrap_or_default(),
        );
    }

    pub(crate) fn push_pong(&self, id: &str) {
        self.push_message(id.to_string(), WsMessageType::Pong, serde_json::Value::Null);
    }

    /// Simulates the network dropping the latest link.
    pub(crate) fn drop_link(&self, reason: &str) {
        self.push(Err(TransportError::Closed(reason.to_string())));
    }

    fn push_message(&self, id: String, msg_type: WsMessageType, payload: serde_json::Value) {
        let msg = WsMessage {
            id,
            msg_type,
            timestamp: Utc::now(),
            payload,
        };
        let Ok(text) = serde_json::to_string(&msg) else {
            panic!("test frame serializes");
        };
        self.push(Ok(text));
    }

    fn push(&self, frame: Result<String, TransportError>) {
        let state = self.state.lock();
        let Some(link) = state.links.last() else {
            panic!("no link opened yet");
        };
        let _ = link.inbound.send(frame);
    }
}

fn parse_command(text: &str) -> WsCommand {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        panic!("client wrote a non-envelope frame: {text}");
    };
    assert_eq!(msg.msg_type, WsMessageType::Command);
    let Ok(command) = serde_json::from_value(msg.payload) else {
        panic!("client wrote an unknown command: {text}");
    };
    command
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        _url: &str,
        token: &Token,
    ) -> Result<Box<dyn TransportConnection>, TransportError> {
        self.state.lock().attempts.push(token.clone());
        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(TransportError::Open("transport dropped".to_string()));
        }

        let mut state = self.state.lock();
        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }
        let (inbound, rx) = mpsc::unbounded_channel();
        let idx = state.links.len();
        state.links.push(MockLink {
            token: token.clone(),
            sent: Vec::new(),
            closed: false,
            inbound,
        });
        Ok(Box::new(MockConnection {
            idx,
            state: Arc::clone(&self.state),
            inbound: rx,
        }))
    }
}

#[derive(Debug)]
struct MockConnection {
    idx: usize,
    state: Arc<Mutex<TransportState>>,
    inbound: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

impl MockConnection {
    fn mark_closed(&self) {
        if let Some(link) = self.state.lock().links.get_mut(self.idx) {
            link.closed = true;
        }
    }
}

#[async_trait]
impl TransportConnection for MockConnection {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        match state.links.get_mut(self.idx) {
            Some(link) if !link.closed => {
                link.sent.push(text);
                Ok(())
            }
            _ => Err(TransportError::Send("link closed".to_string())),
        }
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        match self.inbound.recv().await {
            Some(frame) => frame,
            None => Err(TransportError::Closed("mock link gone".to_string())),
        }
    }

    async fn close(&mut self) {
        self.mark_closed();
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.mark_closed();
    }
}
