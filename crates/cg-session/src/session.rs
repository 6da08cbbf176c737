//! The connection state machine.
//!
//! All mutations run on a single driver task fed through a command channel:
//! client events (tagged with the connection generation they came from),
//! pairing-expiry ticks and reconnect ticks. Public operations take the same
//! lock, so readers always observe a consistent snapshot.

use std::sync::{Arc, Weak};
use std::time::Duration;

use cg_core::history::MessageHistoryBuffer;
use cg_core::types::{
    CloseReason, ConnectionState, HistoryEntry, SessionFault, SessionSnapshot,
};
use cg_telemetry::metrics::global_metrics;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::client::{
    ChatClient, ChatHandle, ClientError, ClientEvent, Connection, InboundMessage, LifecycleUpdate,
    LinkStatus, OutboundDocument,
};
use crate::pairing::{PairingCredential, PairingRenderer, QrPngRenderer};
use crate::policy::ReconnectPolicy;
use crate::store::CredentialStore;
use crate::subscriber::InboundSubscribers;

/// Suffix appended to bare phone-number peer ids.
pub const USER_JID_SUFFIX: &str = "@s.whatsapp.net";

const DEFAULT_DISPLAY_NAME: &str = "User";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is not connected")]
    NotConnected,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("credential store: {0}")]
    Store(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

enum Command {
    Event { generation: u64, event: ClientEvent },
    PairingExpired { pairing_generation: u64 },
    Retry { generation: u64 },
}

struct SessionCore {
    state: ConnectionState,
    credential: Option<PairingCredential>,
    reconnect_attempts: u32,
    fault: Option<SessionFault>,
    handle: Option<Arc<dyn ChatHandle>>,
    /// Bumped on every connect attempt and on logout; events tagged with an
    /// older value are ignored.
    generation: u64,
    /// Bumped on every new pairing challenge; guards the expiry timer.
    pairing_generation: u64,
    connect_in_flight: bool,
    pairing_timer: Option<AbortHandle>,
    retry_timer: Option<AbortHandle>,
    forwarder: Option<AbortHandle>,
}

impl SessionCore {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            credential: None,
            reconnect_attempts: 0,
            fault: None,
            handle: None,
            generation: 0,
            pairing_generation: 0,
            connect_in_flight: false,
            pairing_timer: None,
            retry_timer: None,
            forwarder: None,
        }
    }

    fn retry_pending(&self) -> bool {
        self.retry_timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn cancel_pairing_timer(&mut self) {
        if let Some(t) = self.pairing_timer.take() {
            t.abort();
        }
    }

    fn cancel_retry_timer(&mut self) {
        if let Some(t) = self.retry_timer.take() {
            t.abort();
        }
    }

    fn cancel_forwarder(&mut self) {
        if let Some(t) = self.forwarder.take() {
            t.abort();
        }
    }
}

struct Inner {
    client: Arc<dyn ChatClient>,
    renderer: Arc<dyn PairingRenderer>,
    store: CredentialStore,
    policy: ReconnectPolicy,
    core: RwLock<SessionCore>,
    history: RwLock<MessageHistoryBuffer>,
    subscribers: InboundSubscribers,
    commands: flume::Sender<Command>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let core = self.core.get_mut();
        core.cancel_pairing_timer();
        core.cancel_retry_timer();
        core.cancel_forwarder();
    }
}

impl Inner {
    fn transition(&self, core: &mut SessionCore, next: ConnectionState) {
        if core.state != next {
            info!(from = %core.state, to = %next, "session state changed");
            let metrics = global_metrics();
            metrics.increment_counter("session_transitions_total", &[("state", next.as_str())]);
            metrics.set_gauge(
                "session_connected",
                i64::from(next == ConnectionState::Connected),
            );
        }
        core.state = next;
    }

    /// One connect attempt. `expected` carries the generation a reconnect tick
    /// was scheduled under; the tick is dropped if the session moved on.
    async fn connect(&self, expected: Option<u64>) {
        let generation = {
            let mut core = self.core.write().await;
            if expected.is_some_and(|g| g != core.generation) {
                debug!("stale reconnect tick ignored");
                return;
            }
            if expected.is_some()
                && matches!(
                    core.state,
                    ConnectionState::Connected | ConnectionState::PairingReady
                )
            {
                debug!(state = %core.state, "reconnect tick ignored; session is live");
                return;
            }
            if core.connect_in_flight {
                debug!("connect already in flight");
                return;
            }
            core.connect_in_flight = true;
            core.cancel_retry_timer();
            core.cancel_forwarder();
            core.handle = None;
            core.generation += 1;
            self.transition(&mut core, ConnectionState::Connecting);
            core.generation
        };

        let result = self.client.connect(self.store.path()).await;

        let mut core = self.core.write().await;
        if core.generation != generation {
            debug!(generation, "connect result superseded");
            return;
        }
        core.connect_in_flight = false;
        match result {
            Ok(Connection { handle, events }) => {
                debug!(generation, "client connection established");
                core.handle = Some(handle);
                core.forwarder = Some(self.spawn_forwarder(generation, events));
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                self.transition(&mut core, ConnectionState::Errored);
                self.schedule_retry(&mut core);
            }
        }
    }

    fn spawn_forwarder(&self, generation: u64, events: flume::Receiver<ClientEvent>) -> AbortHandle {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            while let Ok(event) = events.recv_async().await {
                if commands.send(Command::Event { generation, event }).is_err() {
                    return;
                }
            }
            debug!(generation, "client event stream ended");
        })
        .abort_handle()
    }

    fn schedule_retry(&self, core: &mut SessionCore) {
        if core.reconnect_attempts >= self.policy.max_attempts {
            core.cancel_retry_timer();
            core.fault = Some(SessionFault::MaxRetriesExceeded);
            self.transition(core, ConnectionState::Errored);
            error!(
                attempts = core.reconnect_attempts,
                "reconnect attempts exhausted; logout and restart required"
            );
            return;
        }

        core.reconnect_attempts += 1;
        let delay = self.policy.delay_for(core.reconnect_attempts);
        let commands = self.commands.clone();
        let generation = core.generation;
        core.cancel_retry_timer();
        core.retry_timer = Some(
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = commands.send(Command::Retry { generation });
            })
            .abort_handle(),
        );
        global_metrics().increment_counter("session_reconnects_scheduled_total", &[]);
        warn!(
            attempt = core.reconnect_attempts,
            max = self.policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
    }

    fn spawn_pairing_timer(&self, pairing_generation: u64) -> AbortHandle {
        let commands = self.commands.clone();
        let ttl = self.policy.pairing_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = commands.send(Command::PairingExpired { pairing_generation });
        })
        .abort_handle()
    }

    async fn handle_event(&self, generation: u64, event: ClientEvent) {
        match event {
            ClientEvent::ConnectionUpdate(update) => self.apply_lifecycle(generation, update).await,
            ClientEvent::Message(msg) => self.on_inbound_message(msg).await,
        }
    }

    async fn apply_lifecycle(&self, generation: u64, update: LifecycleUpdate) {
        if let Some(payload) = update.pairing_challenge {
            self.on_pairing(generation, payload).await;
        }
        match update.connection {
            Some(LinkStatus::Close) => {
                self.on_close(generation, CloseReason::from_status_code(update.status_code))
                    .await
            }
            Some(LinkStatus::Open) => self.on_open(generation).await,
            Some(LinkStatus::Connecting) | None => {}
        }
    }

    async fn on_pairing(&self, generation: u64, payload: String) {
        let image = match self.renderer.render(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "pairing credential render failed; raw payload only");
                Vec::new()
            }
        };
        let credential = PairingCredential {
            raw: payload,
            image,
            content_type: self.renderer.content_type(),
        };

        let mut core = self.core.write().await;
        if core.generation != generation {
            debug!(generation, "stale pairing challenge ignored");
            return;
        }
        core.cancel_retry_timer();
        core.credential = Some(credential);
        core.reconnect_attempts = 0;
        core.fault = None;
        core.pairing_generation += 1;
        core.cancel_pairing_timer();
        core.pairing_timer = Some(self.spawn_pairing_timer(core.pairing_generation));
        self.transition(&mut core, ConnectionState::PairingReady);
        info!(ttl_secs = self.policy.pairing_ttl.as_secs(), "pairing credential available");
    }

    async fn on_close(&self, generation: u64, reason: CloseReason) {
        let mut core = self.core.write().await;
        if core.generation != generation {
            debug!(generation, "stale close ignored");
            return;
        }
        core.credential = None;
        core.cancel_pairing_timer();
        core.handle = None;
        self.transition(&mut core, ConnectionState::Disconnected);

        if reason.is_retryable() {
            info!(?reason, "connection closed");
            self.schedule_retry(&mut core);
            return;
        }

        core.cancel_retry_timer();
        if reason == CloseReason::LoggedOut {
            core.reconnect_attempts = 0;
            core.fault = Some(SessionFault::LoggedOut);
            error!("logged out by the network; pair again to continue");
        } else {
            core.fault = Some(SessionFault::SessionInvalid);
            error!(
                credentials = %self.store.path().display(),
                "session invalid; remove the credential store and pair again"
            );
        }
    }

    async fn on_open(&self, generation: u64) {
        let mut core = self.core.write().await;
        if core.generation != generation {
            debug!(generation, "stale open ignored");
            return;
        }
        core.credential = None;
        core.cancel_pairing_timer();
        core.cancel_retry_timer();
        core.reconnect_attempts = 0;
        core.fault = None;
        self.transition(&mut core, ConnectionState::Connected);
    }

    async fn expire_pairing(&self, pairing_generation: u64) {
        let mut core = self.core.write().await;
        if core.state == ConnectionState::PairingReady
            && core.pairing_generation == pairing_generation
        {
            core.credential = None;
            core.pairing_timer = None;
            info!("pairing credential expired");
        }
    }

    async fn on_inbound_message(&self, msg: InboundMessage) {
        let Some(key) = msg.key.as_ref() else {
            return;
        };
        if key.from_me || key.remote_jid.ends_with("@broadcast") {
            return;
        }

        let display_name = msg
            .push_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());
        let entry = HistoryEntry::new(
            msg.body().to_lowercase(),
            key.remote_jid.clone(),
            display_name,
            key.id.clone(),
        );

        self.history.write().await.append(entry.clone());
        global_metrics().increment_counter("messages_inbound_total", &[]);
        debug!(from = %entry.from, message_id = %entry.message_id, "inbound message recorded");
        self.subscribers.publish(&entry);
    }
}

async fn drive(inner: Weak<Inner>, commands: flume::Receiver<Command>) {
    while let Ok(command) = commands.recv_async().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        match command {
            Command::Event { generation, event } => inner.handle_event(generation, event).await,
            Command::PairingExpired { pairing_generation } => {
                inner.expire_pairing(pairing_generation).await
            }
            Command::Retry { generation } => inner.connect(Some(generation)).await,
        }
    }
    debug!("session driver stopped");
}

/// Qualify a bare peer id with the user-jid suffix.
pub fn normalize_jid(peer: &str) -> String {
    if peer.contains('@') {
        peer.to_string()
    } else {
        format!("{peer}{USER_JID_SUFFIX}")
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Page of recent history plus the total buffered.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub total: usize,
    pub messages: Vec<HistoryEntry>,
}

/// Cheaply cloneable handle to the single chat-network session.
#[derive(Clone)]
pub struct ConnectionSession {
    inner: Arc<Inner>,
}

/// Non-owning reference held by background consumers.
#[derive(Clone)]
pub struct WeakSession(Weak<Inner>);

impl WeakSession {
    pub fn upgrade(&self) -> Option<ConnectionSession> {
        self.0.upgrade().map(|inner| ConnectionSession { inner })
    }
}

impl ConnectionSession {
    pub fn builder(client: impl ChatClient) -> SessionBuilder {
        SessionBuilder::new(client)
    }

    /// Request a fresh connection. Clears the reconnect budget and any fault.
    pub async fn start(&self) {
        {
            let mut core = self.inner.core.write().await;
            core.reconnect_attempts = 0;
            core.fault = None;
        }
        self.inner.connect(None).await;
    }

    /// Apply a lifecycle update as if it came from the current connection.
    pub async fn handle_lifecycle_event(&self, update: LifecycleUpdate) {
        let generation = self.inner.core.read().await.generation;
        self.inner.apply_lifecycle(generation, update).await;
    }

    pub async fn on_inbound_message(&self, msg: InboundMessage) {
        self.inner.on_inbound_message(msg).await;
    }

    pub async fn send(&self, peer: &str, text: &str) -> Result<(), SessionError> {
        let handle = self.connected_handle().await?;
        let jid = normalize_jid(peer);
        handle.send_text(&jid, text).await?;
        global_metrics().increment_counter("messages_sent_total", &[("kind", "text")]);
        debug!(to = %jid, "text sent");
        Ok(())
    }

    pub async fn send_document(
        &self,
        peer: &str,
        document: &OutboundDocument,
    ) -> Result<(), SessionError> {
        let handle = self.connected_handle().await?;
        let jid = normalize_jid(peer);
        handle.send_document(&jid, document).await?;
        global_metrics().increment_counter("messages_sent_total", &[("kind", "document")]);
        debug!(to = %jid, filename = %document.filename, bytes = document.bytes.len(), "document sent");
        Ok(())
    }

    /// Terminate the session, discard credentials and return to
    /// `Disconnected`. Local state is reset even if the client call fails.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let handle = {
            let mut core = self.inner.core.write().await;
            core.cancel_pairing_timer();
            core.cancel_retry_timer();
            core.cancel_forwarder();
            core.generation += 1;
            core.connect_in_flight = false;
            core.credential = None;
            core.reconnect_attempts = 0;
            core.fault = None;
            self.inner.transition(&mut core, ConnectionState::Disconnected);
            core.handle.take()
        };

        let client_result = match handle {
            Some(handle) => handle.logout().await,
            None => Ok(()),
        };
        let store_result = self.inner.store.discard().await;
        info!("session logged out");

        client_result?;
        store_result?;
        Ok(())
    }

    /// Schedule a single connect after `delay`. The timer shares the reconnect
    /// slot, so a later `logout`, `start` or restart replaces it.
    pub async fn restart_after(&self, delay: Duration) {
        let mut core = self.inner.core.write().await;
        let commands = self.inner.commands.clone();
        let generation = core.generation;
        core.cancel_retry_timer();
        core.retry_timer = Some(
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = commands.send(Command::Retry { generation });
            })
            .abort_handle(),
        );
        info!(delay_ms = delay.as_millis() as u64, "session restart scheduled");
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let core = self.inner.core.read().await;
        SessionSnapshot {
            state: core.state,
            pairing_credential_available: core.credential.is_some(),
            connected: core.state == ConnectionState::Connected,
            reconnect_attempts: core.reconnect_attempts,
            retry_pending: core.retry_pending(),
            fault: core.fault,
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.core.read().await.state
    }

    pub async fn pairing_credential(&self) -> Option<PairingCredential> {
        self.inner.core.read().await.credential.clone()
    }

    pub async fn history(&self, limit: usize) -> HistoryPage {
        let history = self.inner.history.read().await;
        HistoryPage {
            total: history.len(),
            messages: history.recent(limit),
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.inner.policy
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn downgrade(&self) -> WeakSession {
        WeakSession(Arc::downgrade(&self.inner))
    }

    async fn connected_handle(&self) -> Result<Arc<dyn ChatHandle>, SessionError> {
        let core = self.inner.core.read().await;
        match (core.state, core.handle.as_ref()) {
            (ConnectionState::Connected, Some(handle)) => Ok(Arc::clone(handle)),
            _ => Err(SessionError::NotConnected),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct SessionBuilder {
    client: Arc<dyn ChatClient>,
    renderer: Arc<dyn PairingRenderer>,
    store: CredentialStore,
    policy: ReconnectPolicy,
    history: MessageHistoryBuffer,
    subscribers: InboundSubscribers,
}

impl SessionBuilder {
    pub fn new(client: impl ChatClient) -> Self {
        Self {
            client: Arc::new(client),
            renderer: Arc::new(QrPngRenderer::default()),
            store: CredentialStore::default(),
            policy: ReconnectPolicy::default(),
            history: MessageHistoryBuffer::new(),
            subscribers: InboundSubscribers::default(),
        }
    }

    pub fn renderer(mut self, renderer: impl PairingRenderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn store(mut self, store: CredentialStore) -> Self {
        self.store = store;
        self
    }

    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn subscriber(mut self, name: impl Into<String>, tx: flume::Sender<HistoryEntry>) -> Self {
        self.subscribers.add(name, tx);
        self
    }

    /// Build the session and spawn its driver. Must run inside a Tokio runtime.
    /// Nothing connects until [`ConnectionSession::start`].
    pub fn build(self) -> ConnectionSession {
        let (tx, rx) = flume::unbounded();
        let inner = Arc::new(Inner {
            client: self.client,
            renderer: self.renderer,
            store: self.store,
            policy: self.policy,
            core: RwLock::new(SessionCore::new()),
            history: RwLock::new(self.history),
            subscribers: self.subscribers,
            commands: tx,
        });
        tokio::spawn(drive(Arc::downgrade(&inner), rx));
        ConnectionSession { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jid_normalization() {
        assert_eq!(normalize_jid("5215512345678"), "5215512345678@s.whatsapp.net");
        assert_eq!(normalize_jid("1234@g.us"), "1234@g.us");
        assert_eq!(normalize_jid("x@s.whatsapp.net"), "x@s.whatsapp.net");
    }
}
