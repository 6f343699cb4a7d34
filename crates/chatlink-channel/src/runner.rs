//! Bridge orchestration.
//!
//! A [`Bridge`] owns all mutable state: the watermark, the pending
//! interaction and the session buffers. One `tokio::select!` loop feeds it
//! runtime events, realtime chat messages and poll ticks, so poll cycles never
//! overlap and no state is shared across tasks.
//!
//! The history poller always runs. In direct-message mode the Socket Mode
//! listener is a second producer; both paths go through the one watermark,
//! so a message seen on one path is skipped on the other.
//!
//! Handling is sequential: while a poll cycle or a shell command (up to its
//! timeout) is in progress, runtime events wait in their queue and are
//! applied in order once the loop is free again.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chatlink_agent::{AgentEvent, AgentRuntime, OpencodeClient};
use chatlink_types::BridgeConfig;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, ChatPlatform, HistoryEntry};
use crate::format;
use crate::listener::RealtimeListener;
use crate::notifier::{Notifier, Outbound};
use crate::poller::{InboundHandler, PollReport, Watermark, WatermarkPoller};
use crate::resolver::EndpointResolver;
use crate::router::InteractiveRouter;
use crate::shell::ShellGate;
use crate::slack::SlackApi;
use crate::tracker::{ActivityTracker, TrackerEffect};

const EVENT_QUEUE: usize = 256;
const REALTIME_QUEUE: usize = 64;

/// Routes inbound texts through the router on behalf of the poller.
struct RouterSink<'a, R: ?Sized, O: ?Sized> {
    router: &'a mut InteractiveRouter,
    runtime: &'a R,
    out: &'a O,
}

#[async_trait]
impl<'a, R, O> InboundHandler for RouterSink<'a, R, O>
where
    R: AgentRuntime + ?Sized,
    O: Outbound + ?Sized,
{
    async fn handle_inbound(&mut self, text: &str) -> Result<(), ChannelError> {
        let outcome = self.router.route(text, self.runtime, self.out).await?;
        debug!(?outcome, "routed inbound message");
        Ok(())
    }
}

pub struct Bridge<P, R> {
    resolver: Arc<EndpointResolver<P>>,
    notifier: Notifier<P>,
    runtime: Arc<R>,
    poller: WatermarkPoller,
    router: InteractiveRouter,
    tracker: ActivityTracker,
    channel_mode: bool,
    next_poll: Instant,
}

impl<P: ChatPlatform, R: AgentRuntime> Bridge<P, R> {
    pub fn new(config: &BridgeConfig, platform: Arc<P>, runtime: Arc<R>, instance_id: u16) -> Self {
        let resolver = Arc::new(EndpointResolver::new(platform, &config.slack));
        let now = Instant::now();
        Self {
            notifier: Notifier::new(resolver.clone()),
            resolver,
            runtime,
            poller: WatermarkPoller::new(&config.poll, now),
            router: InteractiveRouter::new(ShellGate::new(config.shell.clone())),
            tracker: ActivityTracker::new(instance_id),
            channel_mode: config.slack.channel_mode(),
            next_poll: now,
        }
    }

    pub fn resolver(&self) -> &Arc<EndpointResolver<P>> {
        &self.resolver
    }

    pub fn router(&self) -> &InteractiveRouter {
        &self.router
    }

    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    pub fn poller(&self) -> &WatermarkPoller {
        &self.poller
    }

    pub fn next_poll(&self) -> Instant {
        self.next_poll
    }

    /// Announce the instance and initialize the watermark.
    pub async fn start(&mut self, banner: &str) {
        self.notifier.send(banner).await;
        self.poller.initialize(&*self.resolver).await;
        let now = Instant::now();
        self.next_poll = now + self.poller.next_delay(now);
    }

    pub async fn handle_event(&mut self, event: AgentEvent) {
        for effect in self.tracker.handle(event) {
            match effect {
                TrackerEffect::Send(text) => self.notifier.send(&text).await,
                TrackerEffect::Install(interaction) => self.router.install(interaction),
                TrackerEffect::MainIdle => {
                    if self.channel_mode {
                        debug!("main session idle, polling now");
                        let now = Instant::now();
                        self.poller.note_activity(now);
                        self.next_poll = now;
                    }
                }
            }
        }
    }

    /// Route a message delivered by the realtime listener, unless history
    /// polling already dispatched it.
    pub async fn handle_realtime(&mut self, entry: HistoryEntry) {
        let Some(text) = entry.text.as_deref() else {
            return;
        };
        match Watermark::parse(&entry.ts) {
            Some(ts) if !self.poller.claim(&ts) => {
                debug!(ts = %ts, "realtime message already dispatched");
                return;
            }
            Some(_) => {}
            None => debug!(ts = %entry.ts, "realtime message with unparseable ts"),
        }

        self.poller.note_activity(Instant::now());
        let mut sink = RouterSink {
            router: &mut self.router,
            runtime: &*self.runtime,
            out: &self.notifier,
        };
        if let Err(e) = sink.handle_inbound(text).await {
            warn!(error = %e, "realtime message handling failed");
        }
    }

    /// Run one poll cycle and schedule the next from the current cadence.
    pub async fn poll_once(&mut self) -> PollReport {
        let mut sink = RouterSink {
            router: &mut self.router,
            runtime: &*self.runtime,
            out: &self.notifier,
        };
        let report = self.poller.poll(&*self.resolver, &mut sink).await;
        if report.dispatched > 0 {
            debug!(
                dispatched = report.dispatched,
                failed = report.failed,
                watermark = self.poller.watermark().map(|w| w.as_str()).unwrap_or("none"),
                "poll cycle"
            );
        }
        let now = Instant::now();
        self.next_poll = now + self.poller.next_delay(now);
        report
    }

    /// Drive the bridge until `shutdown` resolves.
    pub async fn run_until<F>(
        mut self,
        mut events: mpsc::Receiver<AgentEvent>,
        mut realtime: mpsc::Receiver<HistoryEntry>,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                Some(event) = events.recv() => {
                    self.handle_event(event).await;
                }
                Some(entry) = realtime.recv() => {
                    self.handle_realtime(entry).await;
                }
                _ = tokio::time::sleep_until(self.next_poll) => {
                    self.poll_once().await;
                }
            }
        }
    }
}

/// Run a bridge against Slack and an opencode runtime until ctrl-c.
pub async fn run(config: BridgeConfig) {
    let api = Arc::new(SlackApi::new(&config.slack.bot_token));
    let runtime = Arc::new(OpencodeClient::new(&config.agent.base_url));
    let instance_id: u16 = rand::thread_rng().gen_range(1000..=9999);
    let mut bridge = Bridge::new(&config, api.clone(), runtime.clone(), instance_id);

    info!(
        instance = instance_id,
        target = %config.slack.target,
        agent = %config.agent.base_url,
        shell = config.shell.enabled,
        "bridge starting"
    );

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
    tokio::spawn(chatlink_agent::subscribe(runtime, event_tx));

    let (realtime_tx, realtime_rx) = mpsc::channel(REALTIME_QUEUE);
    match config.slack.app_token.as_deref() {
        Some(app_token) if !config.slack.channel_mode() => {
            let listener =
                RealtimeListener::new(api.clone(), app_token, bridge.resolver().clone(), realtime_tx);
            tokio::spawn(listener.run());
            info!("realtime listener enabled alongside history polling");
        }
        _ => drop(realtime_tx),
    }

    let directory = config
        .agent
        .directory
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_string());
    let banner = format::startup_banner(instance_id, &host_name().await, &directory);
    bridge.start(&banner).await;

    bridge
        .run_until(event_rx, realtime_rx, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;
}

async fn host_name() -> String {
    let from_command = tokio::process::Command::new("hostname")
        .output()
        .await
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .filter(|h| !h.is_empty());
    from_command
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_string())
}
