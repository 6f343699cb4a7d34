//! Minimal Slack Web API wrapper for directory lookup, history and posting.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::types::{
    Ack, AuthTestResponse, ConnectionsOpenResponse, ConversationsListResponse,
    ConversationsOpenResponse, HistoryResponse, UsersListResponse,
};
use crate::channel::{ChannelEntry, ChannelError, ChatPlatform, HistoryEntry, UserEntry};

const API_BASE: &str = "https://slack.com/api";

/// Page size for directory listings.
const DIRECTORY_PAGE: u32 = 200;

/// Upper bound on cursor pages followed per listing.
const MAX_DIRECTORY_PAGES: usize = 20;

fn api_error(error: Option<String>) -> ChannelError {
    ChannelError::Api(error.unwrap_or_else(|| "unknown error".into()))
}

pub struct SlackApi {
    client: Client,
    token: String,
    base_url: String,
}

impl SlackApi {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(token, API_BASE)
    }

    /// Point the client at a different API root (used by tests).
    pub fn with_base_url(token: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            token: token.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    /// Request a Socket Mode websocket URL. Authenticates with the app-level
    /// token rather than the bot token.
    pub async fn open_socket_url(&self, app_token: &str) -> Result<String, ChannelError> {
        let resp = self
            .client
            .post(self.url("apps.connections.open"))
            .bearer_auth(app_token)
            .send()
            .await?;
        let parsed: ConnectionsOpenResponse = resp.json().await?;
        if !parsed.ok {
            return Err(api_error(parsed.error));
        }
        parsed
            .url
            .ok_or_else(|| ChannelError::Api("missing socket url".into()))
    }
}

#[async_trait]
impl ChatPlatform for SlackApi {
    async fn auth_identity(&self) -> Result<String, ChannelError> {
        let resp = self
            .client
            .post(self.url("auth.test"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let parsed: AuthTestResponse = resp.json().await?;
        if !parsed.ok {
            return Err(api_error(parsed.error));
        }
        parsed
            .user_id
            .ok_or_else(|| ChannelError::Api("auth.test returned no user_id".into()))
    }

    async fn list_users(&self) -> Result<Vec<UserEntry>, ChannelError> {
        let mut users = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_DIRECTORY_PAGES {
            let limit = DIRECTORY_PAGE.to_string();
            let mut query = vec![("limit", limit.as_str())];
            if let Some(c) = cursor.as_deref() {
                query.push(("cursor", c));
            }
            let resp = self
                .client
                .get(self.url("users.list"))
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await?;
            let parsed: UsersListResponse = resp.json().await?;
            if !parsed.ok {
                return Err(api_error(parsed.error));
            }
            let next = parsed.response_metadata.cursor().map(str::to_string);
            users.extend(parsed.members.into_iter().map(UserEntry::from));
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(count = users.len(), "fetched user directory");
        Ok(users)
    }

    async fn list_channels(&self) -> Result<Vec<ChannelEntry>, ChannelError> {
        let mut channels = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_DIRECTORY_PAGES {
            let limit = DIRECTORY_PAGE.to_string();
            let mut query = vec![
                ("types", "public_channel,private_channel"),
                ("exclude_archived", "true"),
                ("limit", limit.as_str()),
            ];
            if let Some(c) = cursor.as_deref() {
                query.push(("cursor", c));
            }
            let resp = self
                .client
                .get(self.url("conversations.list"))
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await?;
            let parsed: ConversationsListResponse = resp.json().await?;
            if !parsed.ok {
                return Err(api_error(parsed.error));
            }
            let next = parsed.response_metadata.cursor().map(str::to_string);
            channels.extend(parsed.channels.into_iter().map(ChannelEntry::from));
            match next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(count = channels.len(), "fetched channel directory");
        Ok(channels)
    }

    async fn open_direct(&self, user_id: &str) -> Result<String, ChannelError> {
        let resp = self
            .client
            .post(self.url("conversations.open"))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "users": user_id }))
            .send()
            .await?;
        let parsed: ConversationsOpenResponse = resp.json().await?;
        if !parsed.ok {
            return Err(api_error(parsed.error));
        }
        parsed
            .channel
            .map(|c| c.id)
            .ok_or_else(|| ChannelError::Api("conversations.open returned no channel".into()))
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.url("chat.postMessage"))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "channel": channel,
                "text": text,
            }))
            .send()
            .await?;
        let parsed: Ack = resp.json().await?;
        if !parsed.ok {
            return Err(api_error(parsed.error));
        }
        Ok(())
    }

    async fn history(
        &self,
        channel: &str,
        oldest: Option<&str>,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, ChannelError> {
        let limit = limit.to_string();
        let mut query = vec![("channel", channel), ("limit", limit.as_str())];
        if let Some(oldest) = oldest {
            query.push(("oldest", oldest));
        }
        let resp = self
            .client
            .get(self.url("conversations.history"))
            .bearer_auth(&self.token)
            .query(&query)
            .send()
            .await?;
        let parsed: HistoryResponse = resp.json().await?;
        if !parsed.ok {
            return Err(api_error(parsed.error));
        }
        Ok(parsed.messages.into_iter().map(HistoryEntry::from).collect())
    }
}
