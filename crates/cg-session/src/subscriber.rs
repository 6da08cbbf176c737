use cg_core::config::ReplyFlow;
use cg_core::types::HistoryEntry;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::WeakSession;

// ---------------------------------------------------------------------------
// InboundSubscribers
// ---------------------------------------------------------------------------

/// Fan-out of accepted inbound messages. The set is fixed once the session is
/// built.
#[derive(Debug, Default)]
pub struct InboundSubscribers {
    subscribers: Vec<(String, flume::Sender<HistoryEntry>)>,
}

impl InboundSubscribers {
    pub fn add(&mut self, name: impl Into<String>, tx: flume::Sender<HistoryEntry>) {
        self.subscribers.push((name.into(), tx));
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Never blocks: a full subscriber loses the entry.
    pub fn publish(&self, entry: &HistoryEntry) {
        for (name, tx) in &self.subscribers {
            match tx.try_send(entry.clone()) {
                Ok(()) => {}
                Err(flume::TrySendError::Full(_)) => {
                    warn!(subscriber = %name, message_id = %entry.message_id, "subscriber full; dropping message");
                }
                Err(flume::TrySendError::Disconnected(_)) => {
                    debug!(subscriber = %name, "subscriber gone");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// AutoResponder
// ---------------------------------------------------------------------------

/// Keyword-driven auto-replies.
#[derive(Debug, Clone)]
pub struct AutoResponder {
    flows: Vec<ReplyFlow>,
}

impl AutoResponder {
    pub fn new(flows: Vec<ReplyFlow>) -> Self {
        Self { flows }
    }

    /// Answers of the first flow with a keyword among the words of `body`.
    pub fn reply_for(&self, body: &str) -> Option<&[String]> {
        let words: Vec<String> = body
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        self.flows
            .iter()
            .find(|flow| {
                flow.keywords
                    .iter()
                    .any(|k| words.iter().any(|w| w == &k.to_lowercase()))
            })
            .map(|flow| flow.answers.as_slice())
    }

    /// Consume `rx` until the session or the channel goes away.
    pub fn spawn(self, session: WeakSession, rx: flume::Receiver<HistoryEntry>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Ok(entry) = rx.recv_async().await {
                let Some(answers) = self.reply_for(&entry.body) else {
                    continue;
                };
                let Some(session) = session.upgrade() else {
                    break;
                };
                let mut delivered = 0;
                for answer in answers {
                    if let Err(e) = session.send(&entry.from, answer).await {
                        warn!(to = %entry.from, error = %e, "auto-reply failed");
                        break;
                    }
                    delivered += 1;
                }
                if delivered > 0 {
                    info!(to = %entry.from, replies = delivered, "auto-reply sent");
                }
            }
            debug!("auto-responder stopped");
        })
    }
}
