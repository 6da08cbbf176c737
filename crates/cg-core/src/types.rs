use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Lifecycle state of the single chat-network connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    PairingReady,
    Connected,
    Errored,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::PairingReady => "pairing_ready",
            ConnectionState::Connected => "connected",
            ConnectionState::Errored => "errored",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SessionFault
// ---------------------------------------------------------------------------

/// Terminal condition that needs an operator (logout + restart) to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFault {
    MaxRetriesExceeded,
    LoggedOut,
    SessionInvalid,
}

// ---------------------------------------------------------------------------
// CloseReason
// ---------------------------------------------------------------------------

/// Why the network closed the connection, classified from its status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    LoggedOut,
    SessionInvalid,
    ConnectionClosed,
    ConnectionLost,
    ConnectionReplaced,
    RestartRequired,
    /// Unrecognised or missing status code. Treated as retryable.
    Unknown(Option<u16>),
}

impl CloseReason {
    pub fn from_status_code(code: Option<u16>) -> Self {
        match code {
            Some(401) => CloseReason::LoggedOut,
            Some(500) => CloseReason::SessionInvalid,
            Some(428) => CloseReason::ConnectionClosed,
            Some(408) => CloseReason::ConnectionLost,
            Some(440) => CloseReason::ConnectionReplaced,
            Some(515) => CloseReason::RestartRequired,
            other => CloseReason::Unknown(other),
        }
    }

    /// Returns `true` when the reconnect policy may schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CloseReason::LoggedOut | CloseReason::SessionInvalid)
    }
}

// ---------------------------------------------------------------------------
// HistoryEntry
// ---------------------------------------------------------------------------

/// One observed inbound message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub body: String,
    pub from: String,
    pub display_name: String,
    pub message_id: String,
    pub observed_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        body: impl Into<String>,
        from: impl Into<String>,
        display_name: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            body: body.into(),
            from: from.into(),
            display_name: display_name.into(),
            message_id: message_id.into(),
            observed_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// Read-only view of the session handed to request handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub pairing_credential_available: bool,
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub retry_pending: bool,
    pub fault: Option<SessionFault>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_codes_classify() {
        assert_eq!(CloseReason::from_status_code(Some(401)), CloseReason::LoggedOut);
        assert_eq!(
            CloseReason::from_status_code(Some(500)),
            CloseReason::SessionInvalid
        );
        assert_eq!(
            CloseReason::from_status_code(Some(515)),
            CloseReason::RestartRequired
        );
        assert_eq!(
            CloseReason::from_status_code(Some(999)),
            CloseReason::Unknown(Some(999))
        );
        assert_eq!(CloseReason::from_status_code(None), CloseReason::Unknown(None));
    }

    #[test]
    fn only_logout_and_invalid_session_are_terminal() {
        assert!(!CloseReason::LoggedOut.is_retryable());
        assert!(!CloseReason::SessionInvalid.is_retryable());
        assert!(CloseReason::ConnectionLost.is_retryable());
        assert!(CloseReason::Unknown(None).is_retryable());
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionState::PairingReady).unwrap();
        assert_eq!(json, "\"pairing_ready\"");
        assert_eq!(ConnectionState::Errored.to_string(), "errored");
    }

    #[test]
    fn history_entry_uses_camel_case_fields() {
        let entry = HistoryEntry::new("hi", "123@s.whatsapp.net", "Ana", "ABC");
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["displayName"], "Ana");
        assert_eq!(v["messageId"], "ABC");
        assert!(v["observedAt"].is_string());
    }
}
