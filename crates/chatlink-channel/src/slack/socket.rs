//! Socket Mode envelope handling.

use serde_json::json;

use super::types::SocketEnvelope;
use crate::channel::HistoryEntry;
use crate::filter::AuthorFilter;

pub fn parse_envelope(raw: &str) -> Option<SocketEnvelope> {
    serde_json::from_str(raw).ok()
}

/// Acknowledgement frame for an envelope.
pub fn ack_frame(envelope_id: &str) -> String {
    json!({ "envelope_id": envelope_id }).to_string()
}

/// Extract a direct message on `channel_id` that passes `filter`.
///
/// Anything else (other event kinds, other conversations, filtered authors,
/// empty text) yields `None`. The returned entry keeps its `ts` so it can be
/// checked against the history watermark.
pub fn inbound_message(
    envelope: &SocketEnvelope,
    channel_id: &str,
    filter: &AuthorFilter,
) -> Option<HistoryEntry> {
    if envelope.kind != "events_api" {
        return None;
    }
    let payload = envelope.payload.as_ref()?;
    if payload.kind != "event_callback" {
        return None;
    }
    let event = payload.event.as_ref()?;
    if event.kind != "message" || event.channel.as_deref() != Some(channel_id) {
        return None;
    }
    if let Some(kind) = event.channel_type.as_deref() {
        if kind != "im" {
            return None;
        }
    }

    let entry = HistoryEntry::from(event.message.clone());
    if !filter.accepts(&entry) {
        return None;
    }
    if entry.text.as_deref().map_or(true, |t| t.trim().is_empty()) {
        return None;
    }
    Some(entry)
}
