//! Lifecycle management for the single chat-network connection.
//!
//! [`ConnectionSession`](session::ConnectionSession) owns the connection
//! handle and the authoritative [`ConnectionState`](cg_core::types::ConnectionState).
//! It talks to the network only through the [`ChatClient`](client::ChatClient)
//! capability, so the state machine can run against the in-process
//! [`LoopbackClient`](loopback::LoopbackClient) in tests and against the
//! [`SidecarClient`](sidecar::SidecarClient) in production.

pub mod client;
pub mod loopback;
pub mod pairing;
pub mod policy;
pub mod session;
pub mod sidecar;
pub mod store;
pub mod subscriber;

pub use client::{ChatClient, ChatHandle, ClientError, ClientEvent, Connection};
pub use policy::ReconnectPolicy;
pub use session::{ConnectionSession, HistoryPage, SessionBuilder, SessionError, WeakSession};
