//! Chat platform seam and its error type.
//!
//! A [`ChatPlatform`] implementation exposes the handful of directory,
//! conversation and history calls the bridge needs. [`crate::slack::SlackApi`]
//! is the production implementation; tests use [`crate::testing::MockPlatform`].

use async_trait::async_trait;
use chatlink_agent::AgentError;
use thiserror::Error;

/// Errors from channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    Api(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("agent runtime error: {0}")]
    Agent(#[from] AgentError),

    #[error("channel shut down")]
    Shutdown,

    #[error("{0}")]
    Other(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChannelError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        ChannelError::WebSocket(e.to_string())
    }
}

/// An account from the workspace directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserEntry {
    pub id: String,
    pub name: String,
    pub display_name: Option<String>,
    pub display_name_normalized: Option<String>,
}

impl UserEntry {
    /// Exact match on name, display name or normalized display name.
    pub fn matches(&self, wanted: &str) -> bool {
        self.name == wanted
            || self.display_name.as_deref() == Some(wanted)
            || self.display_name_normalized.as_deref() == Some(wanted)
    }
}

/// A public or private channel visible to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub id: String,
    pub name: String,
}

/// One message from conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryEntry {
    /// Platform timestamp, `seconds.micros`.
    pub ts: String,
    pub user: Option<String>,
    /// Set on messages posted by any bot integration.
    pub bot_id: Option<String>,
    /// Edits, joins and other non-plain messages carry a subtype.
    pub subtype: Option<String>,
    pub text: Option<String>,
}

/// Calls the bridge makes against the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// User id of the credential in use.
    async fn auth_identity(&self) -> Result<String, ChannelError>;

    async fn list_users(&self) -> Result<Vec<UserEntry>, ChannelError>;

    /// Public and private channels visible to the credential.
    async fn list_channels(&self) -> Result<Vec<ChannelEntry>, ChannelError>;

    /// Open (or reopen) a direct conversation with `user_id`.
    async fn open_direct(&self, user_id: &str) -> Result<String, ChannelError>;

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChannelError>;

    /// Newest-first history strictly after `oldest`, at most `limit` entries.
    async fn history(
        &self,
        channel: &str,
        oldest: Option<&str>,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, ChannelError>;
}
