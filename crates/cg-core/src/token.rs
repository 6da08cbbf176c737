//! Stateless signed session tokens.
//!
//! A token is `base64(payload) + "." + hex(hmac_sha256(payload))` where
//! `payload = "<subject>.<expiry_epoch_ms>"`. Nothing is stored server-side:
//! validity depends only on the signing secret and the current time.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use ring::hmac;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Lifetime of tokens issued by the interactive login.
pub const SESSION_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Signing secret, zeroed from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct TokenSecret(Vec<u8>);

/// Issues and verifies [`SESSION_TOKEN_TTL`]-style signed tokens.
#[derive(Clone)]
pub struct TokenAuthenticator {
    secret: TokenSecret,
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenAuthenticator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: TokenSecret(secret.as_ref().to_vec()),
        }
    }

    /// Issue a token for `subject` that expires `ttl` from now.
    pub fn issue(&self, subject: &str, ttl: Duration) -> String {
        self.issue_at(subject, ttl, Utc::now().timestamp_millis())
    }

    /// Issue a token as if the current time were `now_ms`.
    pub fn issue_at(&self, subject: &str, ttl: Duration, now_ms: i64) -> String {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expiry = now_ms.saturating_add(ttl_ms);
        let payload = format!("{subject}.{expiry}");
        let tag = hmac::sign(&self.key(), payload.as_bytes());
        format!("{}.{}", BASE64.encode(payload.as_bytes()), hex::encode(tag.as_ref()))
    }

    /// `true` when the signature matches and the expiry is still ahead.
    pub fn verify(&self, token: &str) -> bool {
        self.subject(token).is_some()
    }

    /// The verified subject of `token`, or `None` if it is invalid.
    pub fn subject(&self, token: &str) -> Option<String> {
        self.subject_at(token, Utc::now().timestamp_millis())
    }

    /// Verify as if the current time were `now_ms`.
    pub fn subject_at(&self, token: &str, now_ms: i64) -> Option<String> {
        let (encoded_payload, encoded_sig) = token.trim().split_once('.')?;
        let payload = BASE64.decode(encoded_payload).ok()?;
        let signature = hex::decode(encoded_sig)?;

        // Constant-time comparison happens inside ring.
        hmac::verify(&self.key(), &payload, &signature).ok()?;

        let payload = String::from_utf8(payload).ok()?;
        let (subject, expiry) = payload.rsplit_once('.')?;
        let expiry: i64 = expiry.parse().ok()?;
        if subject.is_empty() || expiry <= now_ms {
            return None;
        }
        Some(subject.to_string())
    }

    fn key(&self) -> hmac::Key {
        hmac::Key::new(hmac::HMAC_SHA256, &self.secret.0)
    }
}

mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: &[u8]) -> String {
        let mut s = String::with_capacity(bytes.len() * 2);
        for &b in bytes {
            s.push(HEX_CHARS[(b >> 4) as usize] as char);
            s.push(HEX_CHARS[(b & 0x0f) as usize] as char);
        }
        s
    }

    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        s.as_bytes()
            .chunks(2)
            .map(|pair| Some((nibble(pair[0])? << 4) | nibble(pair[1])?))
            .collect()
    }

    fn nibble(c: u8) -> Option<u8> {
        match c {
            b'0'..=b'9' => Some(c - b'0'),
            b'a'..=b'f' => Some(c - b'a' + 10),
            b'A'..=b'F' => Some(c - b'A' + 10),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
