use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cg_bridge::documents::DocumentResolver;
use cg_bridge::http_api::{api_router, ApiState};
use cg_bridge::session_guard::{LoginCredentials, SessionGuard};
use cg_core::config::{Config, Secrets};
use cg_core::token::TokenAuthenticator;
use cg_session::pairing::QrPngRenderer;
use cg_session::store::CredentialStore;
use cg_session::subscriber::AutoResponder;
use cg_session::{ChatClient, ConnectionSession};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::shutdown::ShutdownSignal;

/// Inbound messages buffered for the auto-responder before it starts dropping.
const AUTO_REPLY_QUEUE: usize = 64;

/// The chatgate gateway: one chat session behind the HTTP API.
///
/// `new` wires the session, document resolver and guards from config;
/// [`run_with_listener`](Self::run_with_listener) starts the session and
/// serves until the [`ShutdownSignal`] fires.
pub struct Daemon {
    config: Config,
    session: ConnectionSession,
    api_state: Arc<ApiState>,
    shutdown: ShutdownSignal,
    responder: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Build the daemon around `client`. Must run inside a Tokio runtime.
    pub fn new(config: Config, secrets: &Secrets, client: impl ChatClient) -> Result<Self> {
        let mut builder = ConnectionSession::builder(client)
            .renderer(QrPngRenderer::default())
            .store(CredentialStore::new(&config.session.credentials_dir));

        let auto_reply = if config.auto_reply.enabled {
            let (tx, rx) = flume::bounded(AUTO_REPLY_QUEUE);
            builder = builder.subscriber("auto-reply", tx);
            Some(rx)
        } else {
            None
        };

        let session = builder.build();

        let responder = auto_reply.map(|rx| {
            info!(flows = config.auto_reply.flows.len(), "auto-reply enabled");
            AutoResponder::new(config.auto_reply.flows.clone()).spawn(session.downgrade(), rx)
        });

        let documents = DocumentResolver::from_config(&config.documents)
            .context("failed to build document resolver")?;
        let guard = SessionGuard::new(
            TokenAuthenticator::new(&secrets.token_secret),
            LoginCredentials {
                user: secrets.login_user.clone(),
                password: secrets.login_password.clone(),
            },
        );

        let api_state = ApiState::new(session.clone(), guard, documents, secrets.api_key.clone())
            .with_restart_delay(Duration::from_millis(config.session.restart_delay_ms))
            .with_document_limit(config.documents.max_bytes);

        Ok(Self {
            config,
            session,
            api_state: Arc::new(api_state),
            shutdown: ShutdownSignal::new(),
            responder,
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    pub fn api_state(&self) -> &Arc<ApiState> {
        &self.api_state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind the configured `server.bind:server.port`.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.server.bind, self.config.server.port);
        TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))
    }

    /// Bind from config and serve until shutdown.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.run_with_listener(listener).await
    }

    /// Start the session and serve the API on a pre-bound listener until the
    /// shutdown signal fires.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        let addr: SocketAddr = listener.local_addr()?;
        let router = api_router(self.api_state.clone());

        self.session.start().await;
        info!(%addr, "chatgate API listening");

        let shutdown = self.shutdown.clone();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await;

        if let Err(e) = &served {
            error!(error = %e, "API server error");
        }
        info!("API server stopped");
        served.context("API server failed")
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if let Some(responder) = self.responder.take() {
            responder.abort();
        }
    }
}
