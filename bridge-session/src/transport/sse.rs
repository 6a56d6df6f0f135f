//! Incremental decoder for `text/event-stream` bodies.

use bytes::BytesMut;

use crate::error::{SessionError, SessionResult};

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type; `message` when the stream did not name one.
    pub event: String,
    /// Joined `data` lines.
    pub data: String,
    /// Last event id seen, if any.
    pub id: Option<String>,
}

impl SseEvent {
    /// Returns `true` for events that carry JSON-RPC payloads.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.event == "message"
    }
}

/// Buffers body chunks and yields complete events.
///
/// Chunk boundaries may fall anywhere, including inside a UTF-8 sequence or
/// between `\r` and `\n`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: BytesMut,
    event: Option<String>,
    data: Vec<String>,
    last_id: Option<String>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event it completed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Protocol`] when a complete line is not UTF-8.
    pub fn push(&mut self, chunk: &[u8]) -> SessionResult<Vec<SseEvent>> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let mut line = self.pending.split_to(newline + 1);
            line.truncate(newline);
            if line.last() == Some(&b'\r') {
                line.truncate(newline - 1);
            }

            let line = String::from_utf8(line.to_vec())
                .map_err(|err| SessionError::protocol(format!("event stream is not UTF-8: {err}")))?;

            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        Ok(events)
    }

    /// Flushes an event left open when the body ended without a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let rest = self.pending.split();
            let line = String::from_utf8_lossy(&rest).into_owned();
            let _ = self.process_line(line.trim_end_matches('\r'));
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_owned()),
            "event" => self.event = Some(value.to_owned()),
            "id" if !value.contains('\0') => self.last_id = Some(value.to_owned()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "message".to_owned()),
            data,
            id: self.last_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .push(b"event: message\ndata: {\"jsonrpc\":\"2.0\"}\n\n")
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_message());
        assert_eq!(events[0].data, "{\"jsonrpc\":\"2.0\"}");
    }

    #[test]
    fn handles_split_chunks_and_crlf() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"id: 4\r\nda").unwrap().is_empty());
        assert!(decoder.push(b"ta: first\r").unwrap().is_empty());
        assert!(decoder.push(b"\ndata: second\r\n").unwrap().is_empty());
        let events = decoder.push(b"\r\n").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "first\nsecond");
        assert_eq!(events[0].id.as_deref(), Some("4"));
        assert_eq!(events[0].event, "message");
    }

    #[test]
    fn skips_comments_and_empty_events() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\n\nevent: ping\n\n").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn split_utf8_sequence_survives() {
        let bytes = "data: caf\u{e9}\n\n".as_bytes();
        let (head, tail) = bytes.split_at(10);
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(head).unwrap().is_empty());
        let events = decoder.push(tail).unwrap();
        assert_eq!(events[0].data, "caf\u{e9}");
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").unwrap().is_empty());
        let event = decoder.finish().unwrap();
        assert_eq!(event.data, "tail");
    }
}
