//! Session-token guard for the pairing credential.
//!
//! An operator logs in with the configured username and password and gets a
//! signed, short-lived token in the [`SESSION_COOKIE`] cookie. While the chat
//! session is connected there is no credential to protect, so the guard
//! short-circuits before looking at the cookie.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap};
use cg_core::token::{TokenAuthenticator, SESSION_TOKEN_TTL};
use tracing::debug;

use crate::api_error::ApiError;
use crate::auth::key_matches;

pub const SESSION_COOKIE: &str = "cg_session";

/// Outcome of a successful guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingAccess {
    /// Session is live; answer informationally without checking the token.
    AlreadyConnected,
    Granted { subject: String },
}

/// Username/password pair for the interactive login.
#[derive(Clone)]
pub struct LoginCredentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone)]
pub struct SessionGuard {
    tokens: Arc<TokenAuthenticator>,
    login: LoginCredentials,
    ttl: Duration,
}

impl SessionGuard {
    pub fn new(tokens: TokenAuthenticator, login: LoginCredentials) -> Self {
        Self {
            tokens: Arc::new(tokens),
            login,
            ttl: SESSION_TOKEN_TTL,
        }
    }

    /// Check a login attempt and issue a token for the user on success.
    pub fn login(&self, user: &str, password: &str) -> Option<String> {
        // Evaluate both so a wrong user costs the same as a wrong password.
        let user_ok = key_matches(user, &self.login.user);
        let password_ok = key_matches(password, &self.login.password);
        if user_ok & password_ok {
            Some(self.tokens.issue(user, self.ttl))
        } else {
            None
        }
    }

    pub fn authorize(&self, connected: bool, headers: &HeaderMap) -> Result<PairingAccess, ApiError> {
        if connected {
            return Ok(PairingAccess::AlreadyConnected);
        }
        let token = session_cookie(headers).ok_or_else(|| {
            debug!("pairing requested without session cookie");
            ApiError::Unauthorized
        })?;
        match self.tokens.subject(&token) {
            Some(subject) => Ok(PairingAccess::Granted { subject }),
            None => {
                debug!("pairing requested with invalid or expired session token");
                Err(ApiError::Unauthorized)
            }
        }
    }

    pub fn set_cookie(&self, token: &str) -> String {
        format!(
            "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
            self.ttl.as_secs()
        )
    }
}

pub fn clear_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0")
}

/// Value of the session cookie, if the request carries one.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}
