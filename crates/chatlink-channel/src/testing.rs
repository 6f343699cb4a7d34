//! In-memory test doubles for the chat platform, the agent runtime and the
//! outbound sink.
//!
//! All doubles use `Arc<Mutex<_>>` so they can be cloned into spawned tasks
//! and inspected afterwards.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chatlink_agent::{
    AgentError, AgentRuntime, ModelInfo, ModelRef, PermissionReply, ProviderCatalog,
    ProviderInfo, SessionInfo,
};

use crate::channel::{ChannelEntry, ChannelError, ChatPlatform, HistoryEntry, UserEntry};
use crate::notifier::Outbound;
use crate::poller::Watermark;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MockPlatform
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PlatformState {
    bot_user: Option<String>,
    users: Vec<UserEntry>,
    channels: Vec<ChannelEntry>,
    history: Vec<HistoryEntry>,
    posted: Vec<(String, String)>,
    history_requests: Vec<(Option<String>, u32)>,
    directory_lookups: usize,
    echo_posts: bool,
    fail_directory: bool,
    fail_history: bool,
    fail_post: bool,
}

/// A chat platform backed by in-memory directory and history.
///
/// Direct conversations with user `U` get the channel id `D-U`. History is
/// shared across conversations.
#[derive(Debug, Clone)]
pub struct MockPlatform {
    inner: Arc<Mutex<PlatformState>>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    /// A platform whose bot identity is `UBOT`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PlatformState {
                bot_user: Some("UBOT".into()),
                ..Default::default()
            })),
        }
    }

    pub fn with_user(self, id: &str, name: &str) -> Self {
        self.with_user_entry(UserEntry {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        })
    }

    pub fn with_user_entry(self, user: UserEntry) -> Self {
        lock(&self.inner).users.push(user);
        self
    }

    pub fn with_channel(self, id: &str, name: &str) -> Self {
        self.add_channel(id, name);
        self
    }

    /// Record posted messages into history as bot-authored entries.
    pub fn echoing_posts(self) -> Self {
        lock(&self.inner).echo_posts = true;
        self
    }

    pub fn add_channel(&self, id: &str, name: &str) {
        lock(&self.inner).channels.push(ChannelEntry {
            id: id.into(),
            name: name.into(),
        });
    }

    pub fn set_bot_user(&self, id: Option<&str>) {
        lock(&self.inner).bot_user = id.map(str::to_string);
    }

    pub fn set_fail_directory(&self, fail: bool) {
        lock(&self.inner).fail_directory = fail;
    }

    pub fn set_fail_history(&self, fail: bool) {
        lock(&self.inner).fail_history = fail;
    }

    pub fn set_fail_post(&self, fail: bool) {
        lock(&self.inner).fail_post = fail;
    }

    /// Append a plain message from `user`.
    pub fn push_message(&self, ts: &str, user: &str, text: &str) {
        self.push_entry(HistoryEntry {
            ts: ts.into(),
            user: Some(user.into()),
            text: Some(text.into()),
            ..Default::default()
        });
    }

    pub fn push_entry(&self, entry: HistoryEntry) {
        lock(&self.inner).history.push(entry);
    }

    /// Texts posted so far, in order.
    pub fn posted(&self) -> Vec<String> {
        lock(&self.inner)
            .posted
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// `(channel, text)` pairs posted so far.
    pub fn posted_to(&self) -> Vec<(String, String)> {
        lock(&self.inner).posted.clone()
    }

    /// Number of user or channel directory listings served.
    pub fn directory_lookups(&self) -> usize {
        lock(&self.inner).directory_lookups
    }

    /// `(oldest, limit)` of every history request.
    pub fn history_requests(&self) -> Vec<(Option<String>, u32)> {
        lock(&self.inner).history_requests.clone()
    }
}

fn next_ts(history: &[HistoryEntry]) -> String {
    let newest = history
        .iter()
        .filter_map(|e| Watermark::parse(&e.ts))
        .max()
        .map(|w| w.as_str().to_string())
        .unwrap_or_else(|| "0.000000".into());
    let (secs, micros) = newest.split_once('.').unwrap_or((newest.as_str(), "0"));
    let secs: u64 = secs.parse().unwrap_or_default();
    let micros: u64 = format!("{micros:0<6}").parse().unwrap_or_default();
    let total = secs * 1_000_000 + micros + 1;
    format!("{}.{:06}", total / 1_000_000, total % 1_000_000)
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn auth_identity(&self) -> Result<String, ChannelError> {
        lock(&self.inner)
            .bot_user
            .clone()
            .ok_or_else(|| ChannelError::Api("invalid_auth".into()))
    }

    async fn list_users(&self) -> Result<Vec<UserEntry>, ChannelError> {
        let mut state = lock(&self.inner);
        state.directory_lookups += 1;
        if state.fail_directory {
            return Err(ChannelError::Api("ratelimited".into()));
        }
        Ok(state.users.clone())
    }

    async fn list_channels(&self) -> Result<Vec<ChannelEntry>, ChannelError> {
        let mut state = lock(&self.inner);
        state.directory_lookups += 1;
        if state.fail_directory {
            return Err(ChannelError::Api("ratelimited".into()));
        }
        Ok(state.channels.clone())
    }

    async fn open_direct(&self, user_id: &str) -> Result<String, ChannelError> {
        Ok(format!("D-{user_id}"))
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChannelError> {
        let mut state = lock(&self.inner);
        if state.fail_post {
            return Err(ChannelError::Api("not_in_channel".into()));
        }
        state.posted.push((channel.to_string(), text.to_string()));
        if state.echo_posts {
            let entry = HistoryEntry {
                ts: next_ts(&state.history),
                user: state.bot_user.clone(),
                bot_id: Some("BBOT".into()),
                subtype: None,
                text: Some(text.to_string()),
            };
            state.history.push(entry);
        }
        Ok(())
    }

    async fn history(
        &self,
        _channel: &str,
        oldest: Option<&str>,
        limit: u32,
    ) -> Result<Vec<HistoryEntry>, ChannelError> {
        let mut state = lock(&self.inner);
        state
            .history_requests
            .push((oldest.map(str::to_string), limit));
        if state.fail_history {
            return Err(ChannelError::Api("ratelimited".into()));
        }
        let oldest = oldest.and_then(Watermark::parse);
        let mut entries: Vec<(Watermark, HistoryEntry)> = state
            .history
            .iter()
            .filter_map(|e| Watermark::parse(&e.ts).map(|ts| (ts, e.clone())))
            .filter(|(ts, _)| oldest.as_ref().map_or(true, |o| ts > o))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries
            .into_iter()
            .take(limit as usize)
            .map(|(_, e)| e)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockRuntime
// ---------------------------------------------------------------------------

/// A request the bridge made against [`MockRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Append(String),
    Submit,
    ReplyQuestion {
        request_id: String,
        answer: String,
    },
    ReplyPermission {
        session_id: String,
        request_id: String,
        reply: PermissionReply,
    },
    SetModel(ModelRef),
}

#[derive(Debug, Default)]
struct RuntimeState {
    calls: Vec<RuntimeCall>,
    sessions: Vec<SessionInfo>,
    catalog: ProviderCatalog,
    fail_replies: bool,
    fail_input: bool,
}

/// An agent runtime that records every mutating call.
///
/// Listing sessions and providers is not recorded.
#[derive(Debug, Clone, Default)]
pub struct MockRuntime {
    inner: Arc<Mutex<RuntimeState>>,
}

fn mock_failure() -> AgentError {
    AgentError::Status {
        status: 500,
        body: "mock failure".into(),
    }
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the given `(provider, model)` pairs. The first model of
    /// each provider is its default.
    pub fn with_models(self, models: &[(&str, &str)]) -> Self {
        {
            let mut state = lock(&self.inner);
            let mut providers: Vec<ProviderInfo> = Vec::new();
            let mut defaults = BTreeMap::new();
            for (provider, model) in models {
                defaults
                    .entry(provider.to_string())
                    .or_insert_with(|| model.to_string());
                let info = ModelInfo {
                    id: model.to_string(),
                    name: None,
                };
                match providers.iter_mut().find(|p| p.id == *provider) {
                    Some(p) => p.models.push(info),
                    None => providers.push(ProviderInfo {
                        id: provider.to_string(),
                        name: provider.to_string(),
                        models: vec![info],
                    }),
                }
            }
            state.catalog = ProviderCatalog {
                providers,
                defaults,
            };
        }
        self
    }

    pub fn with_sessions(self, sessions: Vec<SessionInfo>) -> Self {
        lock(&self.inner).sessions = sessions;
        self
    }

    pub fn set_fail_replies(&self, fail: bool) {
        lock(&self.inner).fail_replies = fail;
    }

    pub fn set_fail_input(&self, fail: bool) {
        lock(&self.inner).fail_input = fail;
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        lock(&self.inner).calls.clone()
    }
}

#[async_trait]
impl AgentRuntime for MockRuntime {
    async fn append_prompt(&self, text: &str) -> Result<(), AgentError> {
        let mut state = lock(&self.inner);
        if state.fail_input {
            return Err(mock_failure());
        }
        state.calls.push(RuntimeCall::Append(text.to_string()));
        Ok(())
    }

    async fn submit_prompt(&self) -> Result<(), AgentError> {
        let mut state = lock(&self.inner);
        if state.fail_input {
            return Err(mock_failure());
        }
        state.calls.push(RuntimeCall::Submit);
        Ok(())
    }

    async fn reply_question(&self, request_id: &str, answer: &str) -> Result<(), AgentError> {
        let mut state = lock(&self.inner);
        state.calls.push(RuntimeCall::ReplyQuestion {
            request_id: request_id.to_string(),
            answer: answer.to_string(),
        });
        if state.fail_replies {
            return Err(mock_failure());
        }
        Ok(())
    }

    async fn reply_permission(
        &self,
        session_id: &str,
        request_id: &str,
        reply: PermissionReply,
    ) -> Result<(), AgentError> {
        let mut state = lock(&self.inner);
        state.calls.push(RuntimeCall::ReplyPermission {
            session_id: session_id.to_string(),
            request_id: request_id.to_string(),
            reply,
        });
        if state.fail_replies {
            return Err(mock_failure());
        }
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, AgentError> {
        Ok(lock(&self.inner).sessions.clone())
    }

    async fn providers(&self) -> Result<ProviderCatalog, AgentError> {
        Ok(lock(&self.inner).catalog.clone())
    }

    async fn set_model(&self, model: &ModelRef) -> Result<(), AgentError> {
        lock(&self.inner)
            .calls
            .push(RuntimeCall::SetModel(model.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingOutbound
// ---------------------------------------------------------------------------

/// An outbound sink that keeps every text.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutbound {
    sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send(&self, text: &str) {
        lock(&self.sent).push(text.to_string());
    }
}
