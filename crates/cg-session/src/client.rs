use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Client errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("logout failed: {0}")]
    Logout(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

// ---------------------------------------------------------------------------
// Events emitted by the protocol client
// ---------------------------------------------------------------------------

/// Link status reported by a lifecycle update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connecting,
    Open,
    Close,
}

/// A change in connection status and/or a fresh pairing challenge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleUpdate {
    /// Raw pairing payload, present when the network wants a new device link.
    #[serde(default, rename = "qr")]
    pub pairing_challenge: Option<String>,
    #[serde(default)]
    pub connection: Option<LinkStatus>,
    /// Close status code; only meaningful with [`LinkStatus::Close`].
    #[serde(default)]
    pub status_code: Option<u16>,
}

impl LifecycleUpdate {
    pub fn pairing(payload: impl Into<String>) -> Self {
        Self {
            pairing_challenge: Some(payload.into()),
            ..Self::default()
        }
    }

    pub fn opened() -> Self {
        Self {
            connection: Some(LinkStatus::Open),
            ..Self::default()
        }
    }

    pub fn closed(status_code: Option<u16>) -> Self {
        Self {
            connection: Some(LinkStatus::Close),
            status_code,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageKey {
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
    pub id: String,
}

/// An inbound message as delivered by the protocol client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub key: Option<MessageKey>,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub extended_text: Option<String>,
}

impl InboundMessage {
    pub fn text(remote_jid: &str, id: &str, text: &str) -> Self {
        Self {
            key: Some(MessageKey {
                remote_jid: remote_jid.to_string(),
                from_me: false,
                id: id.to_string(),
            }),
            conversation: Some(text.to_string()),
            ..Self::default()
        }
    }

    /// Conversation text, falling back to the extended-text body.
    pub fn body(&self) -> &str {
        self.conversation
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.extended_text.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    ConnectionUpdate(LifecycleUpdate),
    Message(InboundMessage),
}

/// A resolved document ready for the outbound path.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mimetype: String,
    pub caption: Option<String>,
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// A live connection returned by [`ChatClient::connect`].
pub struct Connection {
    pub handle: Arc<dyn ChatHandle>,
    pub events: flume::Receiver<ClientEvent>,
}

/// Factory for connections to the chat network.
#[async_trait]
pub trait ChatClient: Send + Sync + 'static {
    /// Open a connection using the credentials kept in `credentials_dir`
    /// (created by the client on first pairing).
    async fn connect(&self, credentials_dir: &Path) -> Result<Connection>;
}

/// Outbound operations on a live connection.
#[async_trait]
pub trait ChatHandle: Send + Sync + 'static {
    async fn send_text(&self, jid: &str, text: &str) -> Result<()>;

    async fn send_document(&self, jid: &str, document: &OutboundDocument) -> Result<()>;

    /// Terminate the session and discard its credentials on the network side.
    async fn logout(&self) -> Result<()>;
}
