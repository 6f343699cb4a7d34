//! Slack Web API and Socket Mode wire types.

use serde::Deserialize;

use crate::channel::{ChannelEntry, HistoryEntry, UserEntry};

#[derive(Debug, Deserialize)]
pub(crate) struct Ack {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct ResponseMetadata {
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl ResponseMetadata {
    pub fn cursor(&self) -> Option<&str> {
        self.next_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthTestResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UsersListResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub members: Vec<SlackUser>,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub profile: Option<SlackProfile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlackProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub display_name_normalized: Option<String>,
}

impl From<SlackUser> for UserEntry {
    fn from(user: SlackUser) -> Self {
        let (display_name, display_name_normalized) = match user.profile {
            Some(p) => (
                p.display_name.filter(|n| !n.is_empty()),
                p.display_name_normalized.filter(|n| !n.is_empty()),
            ),
            None => (None, None),
        };
        UserEntry {
            id: user.id,
            name: user.name,
            display_name,
            display_name_normalized,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationsListResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub channels: Vec<SlackChannel>,
    #[serde(default)]
    pub response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlackChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl From<SlackChannel> for ChannelEntry {
    fn from(c: SlackChannel) -> Self {
        ChannelEntry {
            id: c.id,
            name: c.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationsOpenResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub channel: Option<SlackChannel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub messages: Vec<SlackMessage>,
}

/// A message as it appears in history and in `message` events.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SlackMessage {
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl From<SlackMessage> for HistoryEntry {
    fn from(m: SlackMessage) -> Self {
        HistoryEntry {
            ts: m.ts,
            user: m.user,
            bot_id: m.bot_id,
            subtype: m.subtype,
            text: m.text,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectionsOpenResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A Socket Mode frame.
///
/// `hello` and `disconnect` frames carry no envelope id and need no ack.
#[derive(Debug, Clone, Deserialize)]
pub struct SocketEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub envelope_id: Option<String>,
    #[serde(default)]
    pub payload: Option<EventsApiPayload>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsApiPayload {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub event: Option<SlackEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub channel_type: Option<String>,
    #[serde(flatten)]
    pub message: SlackMessage,
}
