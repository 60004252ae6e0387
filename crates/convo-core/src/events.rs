//! Stream event types.
//!
//! Two layers:
//! - [`RawEvent`]: one decoded record, possibly only a fragment of a payload.
//! - [`ClassifiedEvent`]: a completed record after classification. This is the
//!   closed set of things the transcript store knows how to apply.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::messages::ToolInvocation;

/// Wire tag of a record (`type` field).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// Growing assistant text snapshot.
    Msg,
    /// Assistant text (alternate tag used by some producers).
    Assistant,
    /// Tool invocation (`Tool: <name>\nArguments: <json>`).
    Tool,
    /// Output chunk of a tool call.
    ToolOutput,
    /// Server notice, possibly carrying severity markers.
    SystemMessage,
    /// Server-assigned session identity.
    SessionInit,
    /// Any other tag, kept verbatim.
    Unknown(String),
}

impl EventKind {
    /// Parse a wire tag.
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "msg" => Self::Msg,
            "assistant" => Self::Assistant,
            "tool" => Self::Tool,
            "tool_output" => Self::ToolOutput,
            "system_message" => Self::SystemMessage,
            "session_init" => Self::SessionInit,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// The wire tag for this kind.
    pub fn as_wire(&self) -> &str {
        match self {
            Self::Msg => "msg",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::ToolOutput => "tool_output",
            Self::SystemMessage => "system_message",
            Self::SessionInit => "session_init",
            Self::Unknown(tag) => tag,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl From<String> for EventKind {
    fn from(tag: String) -> Self {
        Self::from_wire(&tag)
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_wire().to_owned()
    }
}

/// Explicit completion marker carried by a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionSignal {
    /// The emitter reports the tool finished.
    Complete,
    /// The emitter reports the tool failed.
    Failed,
}

/// One decoded record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Correlation id, if the producer sent one.
    pub id: Option<String>,
    /// Record kind.
    pub kind: EventKind,
    /// Text payload (possibly a fragment).
    pub payload: String,
    /// Explicit completion marker.
    pub signal: Option<CompletionSignal>,
}

impl RawEvent {
    /// Create an event without id or signal.
    pub fn new(kind: EventKind, payload: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            payload: payload.into(),
            signal: None,
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a completion signal.
    #[must_use]
    pub fn with_signal(mut self, signal: CompletionSignal) -> Self {
        self.signal = Some(signal);
        self
    }
}

/// Severity of a system notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// No marker.
    Info,
    /// `WARNING:` marker.
    Warning,
    /// `ERROR:` marker.
    Error,
}

/// One segment of a system message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Severity from the marker that opened the segment.
    pub severity: Severity,
    /// Segment text, marker included.
    pub text: String,
}

/// A completed, classified record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifiedEvent {
    /// Assistant text snapshot.
    AssistantText {
        /// Correlation id.
        id: String,
        /// Full text so far.
        text: String,
    },
    /// Server notices split by severity marker.
    SystemNotice {
        /// Correlation id.
        id: String,
        /// Segments in order of appearance.
        notices: Vec<Notice>,
    },
    /// A tool invocation.
    ToolStart {
        /// Correlation id.
        id: String,
        /// Parsed invocation.
        invocation: ToolInvocation,
    },
    /// Output chunk for a tool call.
    ToolOutput {
        /// Resolved tool id; `None` when nothing could be correlated.
        id: Option<String>,
        /// Decoded output text.
        text: String,
        /// Explicit completion marker.
        signal: Option<CompletionSignal>,
    },
    /// Server-assigned session identity.
    SessionInit {
        /// The session id.
        session_id: String,
    },
    /// Anything that could not be classified. Still shown as plain text.
    Unrecognized {
        /// Correlation id, if any.
        id: Option<String>,
        /// Original payload.
        raw: String,
        /// Why classification failed.
        reason: String,
    },
}

impl ClassifiedEvent {
    /// Correlation id, if the event carries one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::AssistantText { id, .. }
            | Self::SystemNotice { id, .. }
            | Self::ToolStart { id, .. } => Some(id),
            Self::ToolOutput { id, .. } | Self::Unrecognized { id, .. } => id.as_deref(),
            Self::SessionInit { .. } => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
