//! Shared building blocks for the chatgate workspace.
//!
//! - [`config`]: TOML configuration plus env-sourced secrets
//! - [`types`]: connection state, faults and history entries
//! - [`history`]: bounded inbound-message buffer
//! - [`token`]: signed, stateless session tokens

pub mod config;
pub mod history;
pub mod token;
pub mod types;
