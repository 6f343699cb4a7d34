//! Slack side of the chatlink bridge.
//!
//! Resolves the configured chat target, polls its history behind a
//! watermark, routes each inbound text to a pending question or permission,
//! a control command, the opt-in shell or the agent, and turns runtime
//! events into chat output.
//!
//! # Architecture
//!
//! - [`channel`]: the [`ChatPlatform`] seam and its error type
//! - [`slack`]: Slack Web API client and Socket Mode envelopes
//! - [`resolver`]: target resolution and identity caching
//! - [`notifier`]: the outbound path
//! - [`poller`]: watermark polling and adaptive cadence
//! - [`listener`]: optional Socket Mode inbound path
//! - [`router`]: per-message dispatch state machine
//! - [`tracker`]: session output buffering
//! - [`runner`]: the bridge event loop

pub mod channel;
pub mod filter;
pub mod format;
pub mod interaction;
pub mod listener;
pub mod notifier;
pub mod poller;
pub mod resolver;
pub mod router;
pub mod runner;
pub mod shell;
pub mod slack;
pub mod testing;
pub mod tracker;

pub use channel::{ChannelError, ChatPlatform, HistoryEntry};
pub use runner::{run, Bridge};
