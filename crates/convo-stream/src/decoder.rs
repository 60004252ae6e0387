//! # Event Decoder
//!
//! Turns raw transport bytes into [`Frame`]s. Handles:
//! - Line buffering across chunk boundaries (including split UTF-8 sequences)
//! - Optional `data:` prefix (producers send both bare JSON lines and SSE data lines)
//! - `[DONE]` end-of-stream marker
//! - Batched `messages` arrays and structured tool records
//!
//! A malformed record is logged and dropped; decoding always continues.

use bytes::BytesMut;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use convo_core::errors::StreamError;
use convo_core::events::{CompletionSignal, EventKind, RawEvent};
use convo_core::text::truncate_str;

/// One decoded unit of the stream.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// A record, possibly a fragment of a larger payload.
    Event(RawEvent),
    /// The producer signalled end of stream.
    Done,
    /// The producer sent an error record instead of an event.
    ServerError(String),
}

/// Incremental decoder. Feed it chunks in arrival order.
#[derive(Debug)]
pub struct EventDecoder {
    buffer: BytesMut,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Append a chunk and return every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line = self.buffer.split_to(newline_pos + 1);
            line.truncate(newline_pos);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            decode_into(&line, &mut frames);
        }
        frames
    }

    /// Decode whatever is left after the transport closed.
    pub fn finish(&mut self) -> Vec<Frame> {
        let rest = self.buffer.split();
        let mut frames = Vec::new();
        if !rest.is_empty() {
            decode_into(&rest, &mut frames);
        }
        frames
    }

    /// Bytes waiting for a newline.
    pub fn pending_tail(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any buffered partial line.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn decode_into(line: &[u8], frames: &mut Vec<Frame>) {
    match decode_line(line) {
        Ok(decoded) => {
            for frame in &decoded {
                if let Frame::Event(ev) = frame {
                    metrics::counter!("stream_frames_total", "kind" => ev.kind.as_wire().to_owned())
                        .increment(1);
                }
            }
            frames.extend(decoded);
        }
        Err(e) => {
            metrics::counter!("stream_decode_errors_total").increment(1);
            if let StreamError::Decode { reason, preview } = &e {
                warn!(error = %reason, data_preview = %preview, "dropping malformed stream record");
            } else {
                warn!(error = %e, "dropping malformed stream record");
            }
        }
    }
}

/// Decode one complete line.
///
/// Returns an empty vec for lines that carry nothing (blank lines, comments,
/// non-data SSE fields).
pub fn decode_line(line: &[u8]) -> Result<Vec<Frame>, StreamError> {
    let text = std::str::from_utf8(line).map_err(|e| StreamError::Decode {
        reason: format!("invalid UTF-8: {e}"),
        preview: String::from_utf8_lossy(&line[..line.len().min(100)]).into_owned(),
    })?;
    let trimmed = text.trim();

    if trimmed.is_empty() || trimmed.starts_with(':') {
        return Ok(Vec::new());
    }

    let data = if let Some(rest) = trimmed.strip_prefix("data:") {
        rest.trim()
    } else if ["event:", "id:", "retry:"]
        .iter()
        .any(|field| trimmed.starts_with(field))
    {
        debug!(line = truncate_str(trimmed, 100), "ignoring SSE field");
        return Ok(Vec::new());
    } else {
        trimmed
    };

    if data == "[DONE]" {
        return Ok(vec![Frame::Done]);
    }
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let record: WireRecord = serde_json::from_str(data).map_err(|e| StreamError::Decode {
        reason: e.to_string(),
        preview: truncate_str(data, 100).to_owned(),
    })?;
    record.into_frames(data)
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire record
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireRecord {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<Value>,
    message: Option<Value>,
    content: Option<Value>,
    text: Option<Value>,
    messages: Option<Vec<Value>>,
    session_id: Option<String>,
    tool_name: Option<String>,
    name: Option<String>,
    arguments: Option<Value>,
    done: Option<bool>,
    status: Option<String>,
    is_error: Option<bool>,
    error: Option<Value>,
}

impl WireRecord {
    fn into_frames(self, data: &str) -> Result<Vec<Frame>, StreamError> {
        let kind_tag = match (self.kind.as_deref(), &self.error) {
            (None | Some("error"), Some(err)) => {
                return Ok(vec![Frame::ServerError(value_to_text(err))]);
            }
            (Some(tag), _) => tag.to_owned(),
            (None, None) => {
                return Err(StreamError::Decode {
                    reason: "record has no type".into(),
                    preview: truncate_str(data, 100).to_owned(),
                });
            }
        };

        let kind = EventKind::from_wire(&kind_tag);
        let id = self.id.as_ref().and_then(id_to_string);
        let signal = self.signal();

        if let Some(entries) = self.messages.filter(|m| !m.is_empty()) {
            let many = entries.len() > 1;
            let frames = entries
                .iter()
                .enumerate()
                .filter_map(|(i, entry)| {
                    let payload = entry_payload(entry)?;
                    let entry_id = match (&id, many) {
                        (Some(base), true) => Some(format!("{base}.{i}")),
                        (base, _) => base.clone(),
                    };
                    Some(Frame::Event(RawEvent {
                        id: entry_id,
                        kind: kind.clone(),
                        payload,
                        signal,
                    }))
                })
                .collect();
            return Ok(frames);
        }

        let text_payload = self
            .message
            .as_ref()
            .or(self.content.as_ref())
            .or(self.text.as_ref())
            .filter(|v| !v.is_null())
            .map(value_to_text);

        let payload = match kind {
            EventKind::SessionInit => self.session_id.or(text_payload).unwrap_or_default(),
            EventKind::Tool => match (text_payload, self.tool_name.or(self.name)) {
                (Some(text), _) => text,
                (None, Some(name)) => {
                    let args = self
                        .arguments
                        .as_ref()
                        .map_or_else(|| "{}".to_owned(), value_to_text);
                    format!("Tool: {name}\nArguments: {args}")
                }
                (None, None) => String::new(),
            },
            _ => text_payload.unwrap_or_default(),
        };

        Ok(vec![Frame::Event(RawEvent {
            id,
            kind,
            payload,
            signal,
        })])
    }

    fn signal(&self) -> Option<CompletionSignal> {
        let status = self.status.as_deref().map(str::to_ascii_lowercase);
        if self.is_error == Some(true) || matches!(status.as_deref(), Some("error" | "failed")) {
            return Some(CompletionSignal::Failed);
        }
        if self.done == Some(true)
            || matches!(
                status.as_deref(),
                Some("complete" | "completed" | "done" | "success")
            )
        {
            return Some(CompletionSignal::Complete);
        }
        None
    }
}

fn id_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn entry_payload(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => ["message", "content", "text"]
            .iter()
            .find_map(|key| map.get(*key))
            .filter(|v| !v.is_null())
            .map(value_to_text),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn events(frames: Vec<Frame>) -> Vec<RawEvent> {
        frames
            .into_iter()
            .filter_map(|f| match f {
                Frame::Event(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    // ── line framing ──

    #[test]
    fn bare_json_line() {
        let mut dec = EventDecoder::new();
        let evs = events(dec.push(b"{\"type\":\"msg\",\"id\":\"m1\",\"message\":\"Hi\"}\n"));
        assert_eq!(evs, vec![RawEvent::new(EventKind::Msg, "Hi").with_id("m1")]);
    }

    #[test]
    fn data_prefixed_line() {
        let mut dec = EventDecoder::new();
        let evs = events(dec.push(b"data: {\"type\":\"assistant\",\"content\":\"yo\"}\n\n"));
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].kind, EventKind::Assistant);
        assert_eq!(evs[0].payload, "yo");
        assert!(evs[0].id.is_none());
    }

    #[test]
    fn line_split_across_chunks() {
        let mut dec = EventDecoder::new();
        assert!(dec.push(b"{\"type\":\"msg\",\"id\":\"m1\",").is_empty());
        assert!(dec.pending_tail() > 0);
        let evs = events(dec.push(b"\"message\":\"Hello\"}\n"));
        assert_eq!(evs[0].payload, "Hello");
        assert_eq!(dec.pending_tail(), 0);
    }

    #[test]
    fn utf8_sequence_split_across_chunks() {
        let line = "{\"type\":\"msg\",\"id\":\"m\",\"message\":\"héllo\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let mut dec = EventDecoder::new();
        assert!(dec.push(&line[..split]).is_empty());
        let evs = events(dec.push(&line[split..]));
        assert_eq!(evs[0].payload, "héllo");
    }

    #[test]
    fn crlf_line_endings() {
        let mut dec = EventDecoder::new();
        let evs = events(dec.push(b"data: {\"type\":\"msg\",\"message\":\"a\"}\r\n\r\n"));
        assert_eq!(evs[0].payload, "a");
    }

    #[test]
    fn comments_and_sse_fields_skipped() {
        let mut dec = EventDecoder::new();
        let frames = dec.push(b": keepalive\nevent: message\nid: 7\nretry: 1000\n\n");
        assert!(frames.is_empty());
    }

    #[test]
    fn done_marker() {
        let mut dec = EventDecoder::new();
        assert_eq!(dec.push(b"data: [DONE]\n"), vec![Frame::Done]);
    }

    #[test]
    fn finish_processes_tail() {
        let mut dec = EventDecoder::new();
        assert!(dec.push(b"{\"type\":\"msg\",\"message\":\"tail\"}").is_empty());
        let evs = events(dec.finish());
        assert_eq!(evs[0].payload, "tail");
        assert!(dec.finish().is_empty());
    }

    // ── malformed input ──

    #[test]
    fn malformed_record_dropped_and_decoding_continues() {
        let mut dec = EventDecoder::new();
        let frames = dec.push(b"{not json\n{\"type\":\"msg\",\"message\":\"ok\"}\n");
        let evs = events(frames);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].payload, "ok");
    }

    #[test]
    fn invalid_utf8_is_decode_error() {
        assert_matches!(decode_line(&[0xff, 0xfe]), Err(StreamError::Decode { .. }));
    }

    #[test]
    fn missing_type_is_decode_error() {
        assert_matches!(
            decode_line(b"{\"message\":\"x\"}"),
            Err(StreamError::Decode { .. })
        );
    }

    #[test]
    fn error_record_becomes_server_error() {
        assert_eq!(
            decode_line(b"{\"error\":\"agent not found\"}").unwrap(),
            vec![Frame::ServerError("agent not found".into())]
        );
        assert_matches!(
            decode_line(b"data: {\"type\":\"error\",\"error\":{\"code\":500}}").unwrap().as_slice(),
            [Frame::ServerError(msg)] if msg.contains("500")
        );
    }

    // ── record normalization ──

    #[test]
    fn numeric_id_accepted() {
        let evs = events(decode_line(b"{\"type\":\"msg\",\"id\":42,\"message\":\"x\"}").unwrap());
        assert_eq!(evs[0].id.as_deref(), Some("42"));
    }

    #[test]
    fn text_field_fallback() {
        let evs = events(decode_line(b"{\"type\":\"msg\",\"text\":\"from text\"}").unwrap());
        assert_eq!(evs[0].payload, "from text");
    }

    #[test]
    fn session_init_uses_session_id() {
        let evs = events(decode_line(b"{\"type\":\"session_init\",\"session_id\":\"s-1\"}").unwrap());
        assert_eq!(evs[0].kind, EventKind::SessionInit);
        assert_eq!(evs[0].payload, "s-1");
    }

    #[test]
    fn batched_messages_expand_with_suffixed_ids() {
        let line = br#"{"type":"system_message","id":"system_1","messages":["a",{"message":"b"}]}"#;
        let evs = events(decode_line(line).unwrap());
        assert_eq!(evs.len(), 2);
        assert_eq!(evs[0].id.as_deref(), Some("system_1.0"));
        assert_eq!(evs[0].payload, "a");
        assert_eq!(evs[1].id.as_deref(), Some("system_1.1"));
        assert_eq!(evs[1].payload, "b");
    }

    #[test]
    fn single_batched_message_keeps_id() {
        let line = br#"{"type":"system_message","id":"s","messages":["only"]}"#;
        let evs = events(decode_line(line).unwrap());
        assert_eq!(evs[0].id.as_deref(), Some("s"));
    }

    #[test]
    fn structured_tool_record_normalized() {
        let line = br#"{"type":"tool","id":"t1","tool_name":"kubectl","arguments":{"cmd":"get pods"}}"#;
        let evs = events(decode_line(line).unwrap());
        assert_eq!(evs[0].payload, "Tool: kubectl\nArguments: {\"cmd\":\"get pods\"}");
    }

    #[test]
    fn completion_signals() {
        let done = events(decode_line(br#"{"type":"tool_output","id":"t","message":"","done":true}"#).unwrap());
        assert_eq!(done[0].signal, Some(CompletionSignal::Complete));
        let failed =
            events(decode_line(br#"{"type":"tool_output","id":"t","message":"boom","status":"ERROR"}"#).unwrap());
        assert_eq!(failed[0].signal, Some(CompletionSignal::Failed));
        let none = events(decode_line(br#"{"type":"tool_output","message":"x"}"#).unwrap());
        assert_eq!(none[0].signal, None);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        const STREAM: &str = concat!(
            "data: {\"type\":\"session_init\",\"session_id\":\"s\"}\n",
            "{\"type\":\"msg\",\"id\":\"m1\",\"message\":\"héllo wörld\"}\r\n",
            ": ping\n",
            "{\"type\":\"tool\",\"id\":\"t1\",\"message\":\"Tool: k\\nArguments: {}\"}\n",
            "data: [DONE]\n",
        );

        proptest! {
            #[test]
            fn chunking_does_not_change_frames(cuts in proptest::collection::vec(0usize..STREAM.len(), 0..8)) {
                let bytes = STREAM.as_bytes();
                let mut whole = EventDecoder::new();
                let expected = whole.push(bytes);

                let mut points = cuts;
                points.sort_unstable();
                points.dedup();
                let mut dec = EventDecoder::new();
                let mut got = Vec::new();
                let mut start = 0;
                for p in points {
                    got.extend(dec.push(&bytes[start..p]));
                    start = p;
                }
                got.extend(dec.push(&bytes[start..]));
                got.extend(dec.finish());
                prop_assert_eq!(got, expected);
            }
        }
    }
}
