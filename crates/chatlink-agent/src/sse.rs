//! Incremental server-sent event framing.
//!
//! Raw body chunks are pushed in as they arrive and buffered as bytes; a line
//! is decoded only once its `\n` has arrived, so multibyte characters split
//! across chunks survive. Complete events (the joined `data:` lines up to a
//! blank line) come out.

use bytes::BytesMut;

/// Upper bound on buffered bytes without a newline.
const MAX_BUFFER_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct SseAccumulator {
    buffer: BytesMut,
    data_lines: Vec<String>,
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if let Some(event) = self.take_event() {
                    events.push(event);
                }
                continue;
            }
            self.push_line(line);
        }
        if self.buffer.len() > MAX_BUFFER_BYTES {
            tracing::warn!(bytes = self.buffer.len(), "SSE line buffer overflow, clearing");
            self.buffer.clear();
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.buffer.split();
        let rest = String::from_utf8_lossy(&rest);
        for line in rest.lines() {
            self.push_line(line);
        }
        self.take_event()
    }

    fn push_line(&mut self, line: &str) {
        if let Some(data) = line.strip_prefix("data:") {
            self.data_lines.push(data.trim_start().to_string());
        }
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        let event = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_event() {
        let mut acc = SseAccumulator::new();
        let events = acc.push(b"data: {\"a\":1}\n\n");
        assert_eq!(events, vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn event_split_across_chunks() {
        let mut acc = SseAccumulator::new();
        assert!(acc.push(b"data: {\"ty").is_empty());
        assert!(acc.push(b"pe\":\"x\"}\r\n").is_empty());
        let events = acc.push(b"\r\n");
        assert_eq!(events, vec!["{\"type\":\"x\"}".to_string()]);
    }

    #[test]
    fn multi_line_data_is_joined() {
        let mut acc = SseAccumulator::new();
        let events = acc.push(b"event: message\ndata: one\ndata: two\n\ndata: three\n\n");
        assert_eq!(events, vec!["one\ntwo".to_string(), "three".to_string()]);
    }

    #[test]
    fn comments_and_ids_are_ignored() {
        let mut acc = SseAccumulator::new();
        let events = acc.push(b": keepalive\nid: 7\n\ndata: x\n\n");
        assert_eq!(events, vec!["x".to_string()]);
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let mut acc = SseAccumulator::new();
        let raw = "data: {\"text\":\"h\u{e9}llo \u{1f600}\"}\n\n".as_bytes();
        let split = raw.iter().position(|&b| b == 0xC3).unwrap() + 1;
        assert!(acc.push(&raw[..split]).is_empty());
        let events = acc.push(&raw[split..]);
        assert_eq!(events, vec!["{\"text\":\"h\u{e9}llo \u{1f600}\"}".to_string()]);
        assert!(!events[0].contains('\u{fffd}'));
    }

    #[test]
    fn emoji_split_byte_by_byte() {
        let mut acc = SseAccumulator::new();
        let mut events = Vec::new();
        for byte in "data: \u{1f680} launch\n\n".as_bytes() {
            events.extend(acc.push(std::slice::from_ref(byte)));
        }
        assert_eq!(events, vec!["\u{1f680} launch".to_string()]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut acc = SseAccumulator::new();
        assert!(acc.push(b"data: tail").is_empty());
        assert_eq!(acc.finish(), Some("tail".to_string()));
        assert_eq!(acc.finish(), None);
    }
}
