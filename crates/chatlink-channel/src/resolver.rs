//! Target resolution and identity caching.
//!
//! Every lookup runs at most once per process. A failed endpoint resolution
//! is cached too: the bridge then skips every send and poll for the rest of
//! the run instead of hammering the directory.

use std::sync::Arc;

use chatlink_types::{SlackConfig, Target};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::channel::{ChannelError, ChatPlatform};
use crate::filter::{AuthorFilter, SourceRestriction};

/// A resolved, addressable conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRef {
    pub channel_id: String,
}

pub struct EndpointResolver<P: ?Sized> {
    platform: Arc<P>,
    target: Target,
    source_user: Option<String>,
    endpoint: OnceCell<Option<EndpointRef>>,
    target_user: OnceCell<Option<String>>,
    source_user_id: OnceCell<Option<String>>,
    bot_user: OnceCell<String>,
}

impl<P: ChatPlatform + ?Sized> EndpointResolver<P> {
    pub fn new(platform: Arc<P>, config: &SlackConfig) -> Self {
        Self {
            platform,
            target: config.target.clone(),
            source_user: config.source_identity().map(str::to_string),
            endpoint: OnceCell::new(),
            target_user: OnceCell::new(),
            source_user_id: OnceCell::new(),
            bot_user: OnceCell::new(),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The conversation to post to and poll, or `None` if it cannot be found.
    pub async fn endpoint(&self) -> Option<&EndpointRef> {
        self.endpoint
            .get_or_init(|| async {
                match self.resolve_endpoint().await {
                    Ok(Some(endpoint)) => {
                        info!(target = %self.target, channel = %endpoint.channel_id, "resolved chat endpoint");
                        Some(endpoint)
                    }
                    Ok(None) => {
                        warn!(target = %self.target, "chat target not found, sends and polls disabled");
                        None
                    }
                    Err(e) => {
                        warn!(target = %self.target, error = %e, "chat target resolution failed, sends and polls disabled");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    async fn resolve_endpoint(&self) -> Result<Option<EndpointRef>, ChannelError> {
        match &self.target {
            Target::Channel(name) => {
                let name = name.trim_start_matches('#');
                let channels = self.platform.list_channels().await?;
                Ok(channels
                    .into_iter()
                    .find(|c| c.name == name)
                    .map(|c| EndpointRef { channel_id: c.id }))
            }
            Target::User(name) => {
                let Some(user_id) = self.target_user_id(name).await else {
                    return Ok(None);
                };
                let channel_id = self.platform.open_direct(&user_id).await?;
                Ok(Some(EndpointRef { channel_id }))
            }
        }
    }

    async fn target_user_id(&self, name: &str) -> Option<String> {
        self.target_user
            .get_or_init(|| self.lookup_user(name))
            .await
            .clone()
    }

    async fn lookup_user(&self, name: &str) -> Option<String> {
        match self.platform.list_users().await {
            Ok(users) => {
                let found = users.into_iter().find(|u| u.matches(name)).map(|u| u.id);
                if found.is_none() {
                    warn!(user = name, "no directory entry matches user");
                }
                found
            }
            Err(e) => {
                warn!(user = name, error = %e, "user directory lookup failed");
                None
            }
        }
    }

    /// The bridge's own user id. Failures are not cached.
    pub async fn bot_user_id(&self) -> Option<&str> {
        match self
            .bot_user
            .get_or_try_init(|| self.platform.auth_identity())
            .await
        {
            Ok(id) => Some(id.as_str()),
            Err(e) => {
                warn!(error = %e, "failed to determine bot identity");
                None
            }
        }
    }

    /// Which authors inbound messages are accepted from.
    pub async fn source_restriction(&self) -> SourceRestriction {
        let Some(name) = self.source_user.as_deref() else {
            return SourceRestriction::Anyone;
        };
        let id = match &self.target {
            Target::User(target) if target == name => self.target_user_id(name).await,
            _ => self
                .source_user_id
                .get_or_init(|| self.lookup_user(name))
                .await
                .clone(),
        };
        match id {
            Some(id) => SourceRestriction::Only(id),
            None => SourceRestriction::Unresolved,
        }
    }

    pub async fn author_filter(&self) -> AuthorFilter {
        AuthorFilter {
            bot_user_id: self.bot_user_id().await.map(str::to_string),
            source: self.source_restriction().await,
        }
    }
}
