//! [`ChatClient`] backed by an out-of-process protocol runner reached over a
//! local WebSocket. The runner speaks JSON text frames: lifecycle and message
//! events in, commands out.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::client::{
    ChatClient, ChatHandle, ClientError, ClientEvent, Connection, LifecycleUpdate,
    OutboundDocument, Result,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Commands sent to the runner.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SidecarCommand<'a> {
    Connect {
        auth_dir: String,
    },
    SendText {
        jid: &'a str,
        text: &'a str,
    },
    SendDocument {
        jid: &'a str,
        filename: &'a str,
        mimetype: &'a str,
        data_base64: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<&'a str>,
    },
    Logout,
}

async fn send_command(sink: &mut WsSink, command: &SidecarCommand<'_>) -> std::result::Result<(), String> {
    let json = serde_json::to_string(command).map_err(|e| e.to_string())?;
    sink.send(Message::text(json)).await.map_err(|e| e.to_string())
}

#[derive(Debug, Clone)]
pub struct SidecarClient {
    url: String,
}

impl SidecarClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ChatClient for SidecarClient {
    async fn connect(&self, credentials_dir: &Path) -> Result<Connection> {
        let (ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ClientError::Connect(format!("{}: {e}", self.url)))?;
        let (mut sink, mut stream) = ws.split();

        let hello = SidecarCommand::Connect {
            auth_dir: credentials_dir.display().to_string(),
        };
        send_command(&mut sink, &hello)
            .await
            .map_err(ClientError::Connect)?;
        info!(url = %self.url, "sidecar connected");

        let (tx, rx) = flume::unbounded();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => {
                            if tx.send(event).is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!(error = %e, "unparseable sidecar frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "sidecar closed the socket");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "sidecar socket error");
                        break;
                    }
                }
            }
            // A vanished runner looks like a lost connection to the session.
            let _ = tx.send(ClientEvent::ConnectionUpdate(LifecycleUpdate::closed(None)));
        })
        .abort_handle();

        Ok(Connection {
            handle: Arc::new(SidecarHandle {
                sink: Mutex::new(sink),
                reader,
            }),
            events: rx,
        })
    }
}

struct SidecarHandle {
    sink: Mutex<WsSink>,
    reader: AbortHandle,
}

impl Drop for SidecarHandle {
    // The reader owns the read half; the socket stays open until it stops.
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl ChatHandle for SidecarHandle {
    async fn send_text(&self, jid: &str, text: &str) -> Result<()> {
        let mut sink = self.sink.lock().await;
        send_command(&mut sink, &SidecarCommand::SendText { jid, text })
            .await
            .map_err(ClientError::Send)
    }

    async fn send_document(&self, jid: &str, document: &OutboundDocument) -> Result<()> {
        let command = SidecarCommand::SendDocument {
            jid,
            filename: &document.filename,
            mimetype: &document.mimetype,
            data_base64: BASE64.encode(&document.bytes),
            caption: document.caption.as_deref(),
        };
        let mut sink = self.sink.lock().await;
        send_command(&mut sink, &command).await.map_err(ClientError::Send)
    }

    async fn logout(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        send_command(&mut sink, &SidecarCommand::Logout)
            .await
            .map_err(ClientError::Logout)
    }
}
