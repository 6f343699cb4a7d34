//! Outbound path: the only place that produces visible chat output.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::channel::ChatPlatform;
use crate::resolver::EndpointResolver;

/// Sink for chat-visible text.
///
/// Sends are fire-and-forget: failures are logged by the implementation and
/// never reach the caller.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(&self, text: &str);
}

/// Posts to the resolved endpoint, skipping silently while it is unresolved.
pub struct Notifier<P: ?Sized> {
    resolver: Arc<EndpointResolver<P>>,
}

impl<P: ChatPlatform + ?Sized> Notifier<P> {
    pub fn new(resolver: Arc<EndpointResolver<P>>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl<P: ChatPlatform + ?Sized> Outbound for Notifier<P> {
    async fn send(&self, text: &str) {
        let Some(endpoint) = self.resolver.endpoint().await else {
            debug!("no chat endpoint, dropping outbound message");
            return;
        };
        if let Err(e) = self
            .resolver
            .platform()
            .post_message(&endpoint.channel_id, text)
            .await
        {
            warn!(channel = %endpoint.channel_id, error = %e, "failed to post message");
        }
    }
}
