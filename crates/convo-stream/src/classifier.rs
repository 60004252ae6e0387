//! # Event Classifier
//!
//! Maps a completed [`RawEvent`] onto the closed [`ClassifiedEvent`] set.
//! Classification never fails: anything that does not fit its kind's grammar
//! becomes [`ClassifiedEvent::Unrecognized`] and is still shown as text.

use serde_json::Value;
use tracing::debug;

use convo_core::events::{ClassifiedEvent, EventKind, Notice, RawEvent, Severity};
use convo_core::text::decode_unicode_escapes;
use convo_settings::StreamSettings;

use crate::tool_parsing::parse_tool_invocation;

/// Stateless classifier configured with the severity markers to split on.
#[derive(Clone, Debug)]
pub struct Classifier {
    warning_marker: String,
    error_marker: String,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_settings(&StreamSettings::default())
    }
}

impl Classifier {
    /// Create from stream settings.
    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self {
            warning_marker: settings.warning_marker.clone(),
            error_marker: settings.error_marker.clone(),
        }
    }

    /// Classify one completed event.
    ///
    /// `active_tool_id` is the tool currently receiving output; it is used
    /// for `tool_output` records that carry no id of their own. Text events
    /// are expected to carry an id already (the engine assigns local ids).
    pub fn classify(&self, event: RawEvent, active_tool_id: Option<&str>) -> ClassifiedEvent {
        let RawEvent {
            id,
            kind,
            payload,
            signal,
        } = event;

        match kind {
            EventKind::Msg | EventKind::Assistant => ClassifiedEvent::AssistantText {
                id: id.unwrap_or_default(),
                text: payload,
            },
            EventKind::SystemMessage => ClassifiedEvent::SystemNotice {
                id: id.unwrap_or_default(),
                notices: self.split_notices(&unwrap_nested(&payload)),
            },
            EventKind::Tool => {
                let tool_id = id.clone().unwrap_or_default();
                match parse_tool_invocation(&tool_id, &payload) {
                    Ok(invocation) => ClassifiedEvent::ToolStart {
                        id: tool_id,
                        invocation,
                    },
                    Err(e) => {
                        debug!(id = %tool_id, error = %e, "tool record did not parse");
                        ClassifiedEvent::Unrecognized {
                            id,
                            raw: payload,
                            reason: e.to_string(),
                        }
                    }
                }
            }
            EventKind::ToolOutput => ClassifiedEvent::ToolOutput {
                id: id.or_else(|| active_tool_id.map(str::to_owned)),
                text: decode_unicode_escapes(&payload),
                signal,
            },
            EventKind::SessionInit => {
                let session_id = payload.trim();
                if session_id.is_empty() {
                    ClassifiedEvent::Unrecognized {
                        id,
                        raw: payload,
                        reason: "session_init without session id".into(),
                    }
                } else {
                    ClassifiedEvent::SessionInit {
                        session_id: session_id.to_owned(),
                    }
                }
            }
            EventKind::Unknown(tag) => ClassifiedEvent::Unrecognized {
                id,
                raw: payload,
                reason: format!("unknown event type {tag}"),
            },
        }
    }

    /// Whether `notices` opens with an error segment.
    pub fn is_error_report(notices: &[Notice]) -> bool {
        notices.first().is_some_and(|n| n.severity == Severity::Error)
    }

    /// Split a system message into one notice per severity marker.
    ///
    /// Text before the first marker becomes an `Info` notice. Empty segments
    /// are dropped.
    pub fn split_notices(&self, text: &str) -> Vec<Notice> {
        let mut cuts: Vec<(usize, Severity)> = Vec::new();
        for (marker, severity) in [
            (self.warning_marker.as_str(), Severity::Warning),
            (self.error_marker.as_str(), Severity::Error),
        ] {
            if marker.is_empty() {
                continue;
            }
            cuts.extend(text.match_indices(marker).map(|(at, _)| (at, severity)));
        }
        cuts.sort_by_key(|(at, _)| *at);

        let mut notices = Vec::with_capacity(cuts.len() + 1);
        let mut push = |segment: &str, severity| {
            let segment = segment.trim();
            if !segment.is_empty() {
                notices.push(Notice {
                    severity,
                    text: segment.to_owned(),
                });
            }
        };

        let first_cut = cuts.first().map_or(text.len(), |(at, _)| *at);
        push(&text[..first_cut], Severity::Info);
        for (i, (start, severity)) in cuts.iter().enumerate() {
            let end = cuts.get(i + 1).map_or(text.len(), |(next, _)| *next);
            push(&text[*start..end], *severity);
        }
        notices
    }
}

/// Unwrap a system payload that is itself JSON (`{"messages": [...]}` or
/// `{"message": "..."}`). Anything else is returned unchanged.
fn unwrap_nested(payload: &str) -> String {
    let trimmed = payload.trim();
    if !trimmed.starts_with('{') {
        return payload.to_owned();
    }
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) else {
        return payload.to_owned();
    };

    if let Some(Value::Array(entries)) = map.get("messages") {
        let texts: Vec<String> = entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) => Some(s.clone()),
                Value::Object(o) => o.get("message").and_then(Value::as_str).map(str::to_owned),
                _ => None,
            })
            .filter(|s| !s.trim().is_empty())
            .collect();
        return texts.join("\n");
    }
    if let Some(Value::String(message)) = map.get("message") {
        return message.clone();
    }
    payload.to_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use convo_core::events::CompletionSignal;

    fn classify(ev: RawEvent) -> ClassifiedEvent {
        Classifier::default().classify(ev, None)
    }

    // ── text ──

    #[test]
    fn msg_and_assistant_are_text() {
        for kind in [EventKind::Msg, EventKind::Assistant] {
            let out = classify(RawEvent::new(kind, "hi").with_id("m1"));
            assert_eq!(
                out,
                ClassifiedEvent::AssistantText {
                    id: "m1".into(),
                    text: "hi".into()
                }
            );
        }
    }

    // ── tools ──

    #[test]
    fn tool_parses_into_start() {
        let out = classify(RawEvent::new(EventKind::Tool, "Tool: k\nArguments: {\"a\":1}").with_id("t1"));
        assert_matches!(out, ClassifiedEvent::ToolStart { id, invocation } => {
            assert_eq!(id, "t1");
            assert_eq!(invocation.name, "k");
        });
    }

    #[test]
    fn tool_parse_failure_is_unrecognized() {
        let out = classify(RawEvent::new(EventKind::Tool, "Tool: k\nArguments: {oops").with_id("t1"));
        assert_matches!(out, ClassifiedEvent::Unrecognized { id: Some(id), raw, .. } => {
            assert_eq!(id, "t1");
            assert!(raw.contains("oops"));
        });
    }

    #[test]
    fn tool_output_falls_back_to_active_tool() {
        let c = Classifier::default();
        let out = c.classify(RawEvent::new(EventKind::ToolOutput, "line"), Some("t9"));
        assert_matches!(out, ClassifiedEvent::ToolOutput { id: Some(id), .. } if id == "t9");
    }

    #[test]
    fn tool_output_own_id_wins() {
        let c = Classifier::default();
        let out = c.classify(RawEvent::new(EventKind::ToolOutput, "x").with_id("t1"), Some("t9"));
        assert_eq!(out.id(), Some("t1"));
    }

    #[test]
    fn tool_output_without_any_id_is_orphan() {
        let out = classify(RawEvent::new(EventKind::ToolOutput, "x"));
        assert_matches!(out, ClassifiedEvent::ToolOutput { id: None, .. });
    }

    #[test]
    fn tool_output_decodes_escapes_and_keeps_signal() {
        let ev = RawEvent::new(EventKind::ToolOutput, "caf\\u00e9")
            .with_id("t")
            .with_signal(CompletionSignal::Complete);
        assert_matches!(classify(ev), ClassifiedEvent::ToolOutput { text, signal, .. } => {
            assert_eq!(text, "café");
            assert_eq!(signal, Some(CompletionSignal::Complete));
        });
    }

    // ── system messages ──

    #[test]
    fn system_message_split_by_markers() {
        let c = Classifier::default();
        let notices = c.split_notices("Heads up WARNING: disk low ERROR: write failed");
        assert_eq!(
            notices,
            vec![
                Notice { severity: Severity::Info, text: "Heads up".into() },
                Notice { severity: Severity::Warning, text: "WARNING: disk low".into() },
                Notice { severity: Severity::Error, text: "ERROR: write failed".into() },
            ]
        );
    }

    #[test]
    fn repeated_markers_each_get_a_notice() {
        let c = Classifier::default();
        let notices = c.split_notices("WARNING: a\nWARNING: b");
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.severity == Severity::Warning));
    }

    #[test]
    fn empty_system_message_has_no_notices() {
        let out = classify(RawEvent::new(EventKind::SystemMessage, "  ").with_id("s"));
        assert_matches!(out, ClassifiedEvent::SystemNotice { notices, .. } if notices.is_empty());
    }

    #[test]
    fn nested_json_system_payload_unwrapped() {
        let payload = r#"{"messages":["WARNING: slow", {"message": "ok"}, ""]}"#;
        let out = classify(RawEvent::new(EventKind::SystemMessage, payload).with_id("s"));
        assert_matches!(out, ClassifiedEvent::SystemNotice { notices, .. } => {
            assert_eq!(notices.len(), 1);
            assert_eq!(notices[0].text, "WARNING: slow\nok");
        });

        let out = classify(RawEvent::new(EventKind::SystemMessage, r#"{"message":"ERROR: nope"}"#).with_id("s"));
        assert_matches!(out, ClassifiedEvent::SystemNotice { notices, .. } => {
            assert!(Classifier::is_error_report(&notices));
        });
    }

    #[test]
    fn error_report_detection() {
        let c = Classifier::default();
        assert!(Classifier::is_error_report(&c.split_notices("ERROR: boom")));
        assert!(!Classifier::is_error_report(&c.split_notices("note ERROR: boom")));
    }

    // ── session / unknown ──

    #[test]
    fn session_init() {
        assert_eq!(
            classify(RawEvent::new(EventKind::SessionInit, "s-1")),
            ClassifiedEvent::SessionInit { session_id: "s-1".into() }
        );
        assert_matches!(
            classify(RawEvent::new(EventKind::SessionInit, "")),
            ClassifiedEvent::Unrecognized { .. }
        );
    }

    #[test]
    fn unknown_kind_unrecognized() {
        let out = classify(RawEvent::new(EventKind::from_wire("thinking"), "hmm").with_id("x"));
        assert_matches!(out, ClassifiedEvent::Unrecognized { reason, .. } if reason.contains("thinking"));
    }
}
