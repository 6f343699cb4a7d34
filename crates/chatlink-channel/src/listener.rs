//! Socket Mode listener for direct-message mode.
//!
//! Every envelope is acknowledged as soon as it is read. Messages that pass
//! the author filter and belong to the resolved conversation are forwarded to
//! the bridge through an mpsc channel, timestamp included, alongside the
//! history poller. The connection is reopened with exponential backoff
//! whenever it drops.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, ChatPlatform, HistoryEntry};
use crate::resolver::EndpointResolver;
use crate::slack::socket::{ack_frame, inbound_message, parse_envelope};
use crate::slack::SlackApi;

const MAX_BACKOFF_SECS: u64 = 60;

pub struct RealtimeListener<P: ?Sized> {
    socket_api: Arc<SlackApi>,
    app_token: String,
    resolver: Arc<EndpointResolver<P>>,
    tx: mpsc::Sender<HistoryEntry>,
}

impl<P: ChatPlatform + ?Sized> RealtimeListener<P> {
    pub fn new(
        socket_api: Arc<SlackApi>,
        app_token: &str,
        resolver: Arc<EndpointResolver<P>>,
        tx: mpsc::Sender<HistoryEntry>,
    ) -> Self {
        Self {
            socket_api,
            app_token: app_token.to_string(),
            resolver,
            tx,
        }
    }

    /// Listen until the receiving side of the channel is dropped.
    pub async fn run(self) {
        let Some(endpoint) = self.resolver.endpoint().await else {
            warn!("no chat endpoint, realtime listener not started");
            return;
        };
        let channel_id = endpoint.channel_id.clone();
        let mut backoff_secs = 1u64;

        loop {
            match self.socket_api.open_socket_url(&self.app_token).await {
                Ok(url) => match self.run_session(&url, &channel_id).await {
                    Ok(()) => {
                        info!("socket session ended, reconnecting");
                        backoff_secs = 1;
                        continue;
                    }
                    Err(ChannelError::Shutdown) => return,
                    Err(e) => warn!(error = %e, backoff_secs, "socket session failed"),
                },
                Err(e) => warn!(error = %e, backoff_secs, "failed to open socket connection"),
            }
            if self.tx.is_closed() {
                return;
            }
            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
        }
    }

    async fn run_session(&self, url: &str, channel_id: &str) -> Result<(), ChannelError> {
        let (stream, _response) = connect_async(url).await?;
        let (mut sink, mut source) = stream.split();
        info!("socket mode connected");

        while let Some(message) = source.next().await {
            let raw = match message? {
                WsMessage::Text(text) => text,
                WsMessage::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                WsMessage::Close(_) => return Ok(()),
                _ => continue,
            };
            let Some(envelope) = parse_envelope(&raw) else {
                debug!("ignoring undecodable socket frame");
                continue;
            };
            if let Some(id) = envelope.envelope_id.as_deref() {
                sink.send(WsMessage::Text(ack_frame(id))).await?;
            }
            if envelope.kind == "disconnect" {
                info!(reason = envelope.reason.as_deref().unwrap_or("unknown"), "socket disconnect requested");
                return Ok(());
            }

            let filter = self.resolver.author_filter().await;
            if let Some(entry) = inbound_message(&envelope, channel_id, &filter) {
                self.tx
                    .send(entry)
                    .await
                    .map_err(|_| ChannelError::Shutdown)?;
            }
        }
        Ok(())
    }
}
