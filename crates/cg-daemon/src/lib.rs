//! The chatgate daemon: wires config and secrets into a chat session and the
//! HTTP API, then serves until ctrl-c.

pub mod daemon;
pub mod shutdown;
