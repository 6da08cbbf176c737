//! HTTP surface of the gateway.
//!
//! - [`http_api`]: axum router, handlers and shared state
//! - [`auth`]: API-key middleware
//! - [`session_guard`]: login cookie / session-token guard for `/pairing`
//! - [`documents`]: document source resolution for `/send-document`
//! - [`api_error`]: JSON error responses

pub mod api_error;
pub mod auth;
pub mod documents;
pub mod http_api;
pub mod session_guard;
