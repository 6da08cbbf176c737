//! chatgate daemon: loads `.env` and `chatgate.toml`, connects the chat
//! session and serves the HTTP API.
//!
//! `--loopback` swaps the sidecar for an in-process client that reports an
//! open connection immediately, for trying the API without a phone.

use anyhow::{Context, Result};
use cg_core::config::{Config, CredentialProvider};
use cg_daemon::daemon::Daemon;
use cg_session::loopback::LoopbackClient;
use cg_session::sidecar::SidecarClient;
use cg_session::ClientEvent;
use cg_session::client::LifecycleUpdate;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; real deployments set the environment directly.
    dotenv::dotenv().ok();

    let config = Config::load().context("failed to load configuration")?;
    cg_telemetry::logging::init("chatgate", &config.logging.level, config.logging.json);

    let secrets = CredentialProvider::secrets().context("missing required secrets")?;
    let loopback = std::env::args().skip(1).any(|arg| arg == "--loopback");

    info!(version = env!("CARGO_PKG_VERSION"), loopback, "chatgate starting");

    let daemon = if loopback {
        warn!("loopback mode: messages are recorded in memory, nothing is delivered");
        let client = LoopbackClient::scripted(vec![ClientEvent::ConnectionUpdate(
            LifecycleUpdate::opened(),
        )]);
        Daemon::new(config, &secrets, client)?
    } else {
        let client = SidecarClient::new(config.session.sidecar_url.clone());
        Daemon::new(config, &secrets, client)?
    };

    let shutdown = daemon.shutdown_handle();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger();
    });

    daemon.run().await?;
    info!("chatgate stopped");
    Ok(())
}
