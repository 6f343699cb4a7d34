//! Watermark-based history polling.
//!
//! Each cycle fetches a page of history newer than the watermark, drops
//! filtered and already-seen entries, and dispatches the rest oldest first.
//! The watermark advances to an entry's timestamp before that entry is
//! dispatched, so a failing dispatch is never retried.

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chatlink_types::PollConfig;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::channel::{ChannelError, ChatPlatform, HistoryEntry};
use crate::filter::AuthorFilter;
use crate::resolver::EndpointResolver;

/// A platform timestamp (`seconds.micros`), ordered numerically.
#[derive(Debug, Clone)]
pub struct Watermark {
    raw: String,
    secs: u64,
    micros: u64,
}

impl Watermark {
    pub fn parse(ts: &str) -> Option<Self> {
        let (secs, frac) = match ts.split_once('.') {
            Some((s, f)) => (s, f),
            None => (ts, ""),
        };
        if frac.len() > 6 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let secs = secs.parse().ok()?;
        let micros = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<6}").parse().ok()?
        };
        Some(Self {
            raw: ts.to_string(),
            secs,
            micros,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for Watermark {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Watermark {}

impl Ord for Watermark {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.secs, self.micros).cmp(&(other.secs, other.micros))
    }
}

impl PartialOrd for Watermark {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Fast or slow inter-poll delay, chosen from time since last inbound activity.
#[derive(Debug, Clone)]
pub struct PollCadence {
    fast: Duration,
    slow: Duration,
    idle_after: Duration,
    last_activity: Instant,
}

impl PollCadence {
    pub fn new(config: &PollConfig, now: Instant) -> Self {
        Self {
            fast: config.fast_interval(),
            slow: config.slow_interval(),
            idle_after: config.idle_after(),
            last_activity: now,
        }
    }

    pub fn note_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn delay(&self, now: Instant) -> Duration {
        if now.saturating_duration_since(self.last_activity) >= self.idle_after {
            self.slow
        } else {
            self.fast
        }
    }
}

/// Receives inbound texts in order.
#[async_trait]
pub trait InboundHandler: Send {
    async fn handle_inbound(&mut self, text: &str) -> Result<(), ChannelError>;
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Entries handed to the handler.
    pub dispatched: usize,
    /// Entries whose handler returned an error.
    pub failed: usize,
    /// Whether the cycle was skipped (no endpoint or fetch failure).
    pub skipped: bool,
}

pub struct WatermarkPoller {
    watermark: Option<Watermark>,
    cadence: PollCadence,
    page_size: u32,
}

impl WatermarkPoller {
    pub fn new(config: &PollConfig, now: Instant) -> Self {
        Self {
            watermark: None,
            cadence: PollCadence::new(config, now),
            page_size: config.page_size,
        }
    }

    pub fn watermark(&self) -> Option<&Watermark> {
        self.watermark.as_ref()
    }

    pub fn note_activity(&mut self, now: Instant) {
        self.cadence.note_activity(now);
    }

    /// Delay before the next cycle, computed fresh from the activity clock.
    pub fn next_delay(&self, now: Instant) -> Duration {
        self.cadence.delay(now)
    }

    /// Advance the watermark to a message delivered by another inbound path.
    ///
    /// Returns `false` when the watermark is already at or past `ts`, in which
    /// case the message was seen before and must not be dispatched again.
    pub fn claim(&mut self, ts: &Watermark) -> bool {
        if self.watermark.as_ref().is_some_and(|w| w >= ts) {
            return false;
        }
        self.watermark = Some(ts.clone());
        true
    }

    /// Set the watermark to the newest existing message so backlog is never
    /// replayed. An empty conversation leaves it unset.
    pub async fn initialize<P: ChatPlatform + ?Sized>(&mut self, resolver: &EndpointResolver<P>) {
        let Some(endpoint) = resolver.endpoint().await else {
            return;
        };
        match resolver
            .platform()
            .history(&endpoint.channel_id, None, 1)
            .await
        {
            Ok(entries) => {
                self.watermark = entries.iter().filter_map(|e| Watermark::parse(&e.ts)).max();
                info!(
                    watermark = self.watermark.as_ref().map(Watermark::as_str).unwrap_or("none"),
                    "initialized history watermark"
                );
            }
            Err(e) => warn!(error = %e, "failed to initialize history watermark"),
        }
    }

    /// Drop filtered and already-seen entries, then order oldest first.
    pub fn select(&self, entries: Vec<HistoryEntry>, filter: &AuthorFilter) -> Vec<(Watermark, HistoryEntry)> {
        let mut fresh: Vec<(Watermark, HistoryEntry)> = entries
            .into_iter()
            .filter(|e| filter.accepts(e))
            .filter_map(|e| match Watermark::parse(&e.ts) {
                Some(ts) => Some((ts, e)),
                None => {
                    debug!(ts = %e.ts, "skipping entry with unparseable timestamp");
                    None
                }
            })
            .filter(|(ts, _)| self.watermark.as_ref().map_or(true, |w| ts > w))
            .collect();
        fresh.sort_by(|a, b| a.0.cmp(&b.0));
        fresh
    }

    /// Run one fetch-filter-dispatch cycle.
    pub async fn poll<P, H>(&mut self, resolver: &EndpointResolver<P>, handler: &mut H) -> PollReport
    where
        P: ChatPlatform + ?Sized,
        H: InboundHandler + ?Sized,
    {
        let mut report = PollReport::default();
        let Some(endpoint) = resolver.endpoint().await else {
            report.skipped = true;
            return report;
        };
        let oldest = self.watermark.as_ref().map(|w| w.as_str().to_string());
        let entries = match resolver
            .platform()
            .history(&endpoint.channel_id, oldest.as_deref(), self.page_size)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "history fetch failed, skipping cycle");
                report.skipped = true;
                return report;
            }
        };

        if entries.is_empty() {
            return report;
        }
        let filter = resolver.author_filter().await;
        for (ts, entry) in self.select(entries, &filter) {
            self.watermark = Some(ts);
            let Some(text) = entry.text.filter(|t| !t.trim().is_empty()) else {
                continue;
            };
            self.cadence.note_activity(Instant::now());
            report.dispatched += 1;
            if let Err(e) = handler.handle_inbound(&text).await {
                warn!(error = %e, "inbound message handling failed");
                report.failed += 1;
            }
        }
        report
    }
}
