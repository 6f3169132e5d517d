//! hydra-notify headless client.
//!
//! Connects the configured wallet, keeps the push channel open and logs
//! every notification. Challenges are signed interactively: the challenge is
//! printed and the signature read from stdin (an empty line rejects).

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use hydra_notify::auth::{Challenge, HttpIdentityClient, Signature, WalletSigner};
use hydra_notify::config::NotifyConfig;
use hydra_notify::domain::Address;
use hydra_notify::error::AuthError;
use hydra_notify::service::NotifyClient;
use hydra_notify::store::FileSessionStore;
use hydra_notify::ws::WsTransport;

/// Signs challenges by asking the operator on the terminal.
#[derive(Debug)]
struct TerminalSigner {
    stdin: Mutex<BufReader<tokio::io::Stdin>>,
}

impl TerminalSigner {
    fn new() -> Self {
        Self {
            stdin: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

#[async_trait]
impl WalletSigner for TerminalSigner {
    async fn sign(
        &self,
        address: &Address,
        challenge: &Challenge,
    ) -> Result<Signature, AuthError> {
        let mut stdin = self.stdin.lock().await;
        eprintln!("Sign this challenge with wallet {address}:\n\n{}\n", challenge.0);
        eprintln!("Paste the signature (empty line to reject):");

        let mut line = String::new();
        stdin
            .read_line(&mut line)
            .await
            .map_err(|e| AuthError::Identity(format!("cannot read signature: {e}")))?;
        let signature = line.trim();
        if signature.is_empty() {
            return Err(AuthError::SignatureRejected);
        }
        Ok(Signature(signature.to_string()))
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NotifyConfig::from_env().context("loading configuration")?;
    init_tracing(config.log_json);

    let address = config
        .wallet_address
        .clone()
        .context("WALLET_ADDRESS must be set")?;
    tracing::info!(
        push_url = %config.push_url,
        identity_url = %config.identity_url,
        %address,
        "starting hydra-notify"
    );

    let identity = HttpIdentityClient::new(config.identity_url.clone(), config.http_timeout)
        .context("building identity client")?;
    let client = NotifyClient::new(
        &config,
        Arc::new(identity),
        Arc::new(TerminalSigner::new()),
        Arc::new(FileSessionStore::new(config.session_file.clone())),
        Arc::new(WsTransport::new()),
    );

    for channel in &config.channels {
        client.subscribe(channel.clone());
    }
    let _printer = client.on_notification(|event| {
        tracing::info!(
            id = %event.id,
            channel = %event.channel,
            kind = %event.kind,
            title = %event.title,
            body = %event.body,
            occurred_at = %event.occurred_at,
            "notification"
        );
    });

    client.wallet().connect(address);
    if let Err(err) = client.run(shutdown_signal()).await {
        tracing::error!(code = err.error_code(), error = %err, "hydra-notify failed");
        return Err(err.into());
    }

    let stats = client.stats();
    tracing::info!(
        accepted = stats.accepted,
        duplicates = stats.duplicates,
        rate_limited = stats.rate_limited,
        "hydra-notify stopped"
    );
    Ok(())
}
