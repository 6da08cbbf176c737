//! In-process [`ChatClient`] that records traffic instead of touching a
//! network. Tests drive it by emitting events; the daemon uses it in
//! `--loopback` mode.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::info;

use crate::client::{
    ChatClient, ChatHandle, ClientError, ClientEvent, Connection, OutboundDocument, Result,
};

/// Something the loopback client was asked to send.
#[derive(Debug, Clone, PartialEq)]
pub enum SentMessage {
    Text {
        jid: String,
        text: String,
    },
    Document {
        jid: String,
        filename: String,
        mimetype: String,
        caption: Option<String>,
        len: usize,
    },
}

#[derive(Default)]
struct Shared {
    connects: usize,
    failing_connects: usize,
    failing_sends: bool,
    /// Events replayed on every new connection.
    script: Vec<ClientEvent>,
    connections: Vec<flume::Sender<ClientEvent>>,
    sent: Vec<SentMessage>,
    logouts: usize,
}

#[derive(Clone, Default)]
pub struct LoopbackClient {
    shared: Arc<Mutex<Shared>>,
}

impl LoopbackClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `events` on every connection as soon as it opens.
    pub fn scripted(events: Vec<ClientEvent>) -> Self {
        let client = Self::default();
        client.lock().script = events;
        client
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.lock().failing_connects = n;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.lock().failing_sends = fail;
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn logout_count(&self) -> usize {
        self.lock().logouts
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    /// Emit on the most recent connection. Returns `false` if nobody listens.
    pub fn emit(&self, event: ClientEvent) -> bool {
        let shared = self.lock();
        match shared.connections.last() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Emit on the `index`-th successful connection (0-based).
    pub fn emit_on(&self, index: usize, event: ClientEvent) -> bool {
        let shared = self.lock();
        match shared.connections.get(index) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl ChatClient for LoopbackClient {
    async fn connect(&self, credentials_dir: &Path) -> Result<Connection> {
        let mut shared = self.lock();
        shared.connects += 1;
        if shared.failing_connects > 0 {
            shared.failing_connects -= 1;
            return Err(ClientError::Connect("loopback connect refused".into()));
        }

        let (tx, rx) = flume::unbounded();
        for event in &shared.script {
            let _ = tx.send(event.clone());
        }
        shared.connections.push(tx);
        let index = shared.connections.len() - 1;
        info!(index, credentials = %credentials_dir.display(), "loopback connection opened");

        Ok(Connection {
            handle: Arc::new(LoopbackHandle {
                shared: Arc::clone(&self.shared),
            }),
            events: rx,
        })
    }
}

struct LoopbackHandle {
    shared: Arc<Mutex<Shared>>,
}

impl LoopbackHandle {
    fn record(&self, msg: SentMessage) -> Result<()> {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        if shared.failing_sends {
            return Err(ClientError::Send("loopback send refused".into()));
        }
        info!(?msg, "loopback send");
        shared.sent.push(msg);
        Ok(())
    }
}

#[async_trait]
impl ChatHandle for LoopbackHandle {
    async fn send_text(&self, jid: &str, text: &str) -> Result<()> {
        self.record(SentMessage::Text {
            jid: jid.to_string(),
            text: text.to_string(),
        })
    }

    async fn send_document(&self, jid: &str, document: &OutboundDocument) -> Result<()> {
        self.record(SentMessage::Document {
            jid: jid.to_string(),
            filename: document.filename.clone(),
            mimetype: document.mimetype.clone(),
            caption: document.caption.clone(),
            len: document.bytes.len(),
        })
    }

    async fn logout(&self) -> Result<()> {
        let mut shared = self.shared.lock().unwrap_or_else(|e| e.into_inner());
        shared.logouts += 1;
        shared.connections.clear();
        Ok(())
    }
}
