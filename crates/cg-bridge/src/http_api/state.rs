use std::time::{Duration, Instant};

use cg_session::ConnectionSession;

use crate::documents::DocumentResolver;
use crate::session_guard::SessionGuard;

/// Delay before a fresh `start()` after `/session/logout`.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(2000);

/// Request body ceiling: a 16 MiB document after base64 inflation, plus slack.
pub const DEFAULT_BODY_LIMIT: usize = 24 * 1024 * 1024;

/// Shared application state for all HTTP handlers.
pub struct ApiState {
    pub session: ConnectionSession,
    pub guard: SessionGuard,
    pub documents: DocumentResolver,
    pub api_key: String,
    pub restart_delay: Duration,
    pub body_limit: usize,
    pub start_time: Instant,
}

impl ApiState {
    pub fn new(
        session: ConnectionSession,
        guard: SessionGuard,
        documents: DocumentResolver,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            session,
            guard,
            documents,
            api_key: api_key.into(),
            restart_delay: DEFAULT_RESTART_DELAY,
            body_limit: DEFAULT_BODY_LIMIT,
            start_time: Instant::now(),
        }
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Size the body limit for documents of up to `max_document_bytes`.
    pub fn with_document_limit(mut self, max_document_bytes: usize) -> Self {
        self.body_limit = max_document_bytes
            .saturating_mul(4)
            .div_ceil(3)
            .saturating_add(64 * 1024);
        self
    }
}
