//! Core types shared across all chatlink crates.
//!
//! Defines the bridge configuration (chat target, credentials, poll cadence,
//! shell opt-in, agent runtime location) and the shared error type.

pub mod config;
pub mod error;

pub use config::{
    AgentConfig, BridgeConfig, PollConfig, ShellConfig, SlackConfig, Target, DEFAULT_AGENT_URL,
};
pub use error::ChatlinkError;
