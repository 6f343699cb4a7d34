//! Slack backend: Web API client and Socket Mode envelope handling.

pub mod api;
pub mod socket;
pub mod types;

pub use api::SlackApi;
