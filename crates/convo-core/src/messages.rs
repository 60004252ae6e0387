//! Transcript data model.
//!
//! A [`Message`] is the unit the renderer draws. Tool calls are not stored
//! inside messages: a message only references them by id through
//! `tool_call_ids`, and the live [`ToolCallState`] is owned by the tool-call
//! tracker. This keeps the message list append-only while tool state keeps
//! changing underneath it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a transcript message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text typed by the local user.
    User,
    /// Assistant output, including tool-call placeholders.
    Assistant,
    /// Notices from the server and orphaned tool output.
    System,
}

/// One entry in the transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Correlation id. Server-supplied when present, otherwise `local-<n>`.
    pub id: String,
    /// Author.
    pub role: Role,
    /// Creation time, fixed at first append.
    pub created_at: DateTime<Utc>,
    /// Text content. Replaced wholesale when a newer snapshot arrives.
    pub text_parts: Vec<String>,
    /// Tool calls rendered under this message.
    pub tool_call_ids: Vec<String>,
}

impl Message {
    /// Build a plain text message.
    pub fn text(id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            created_at: Utc::now(),
            text_parts: vec![text.into()],
            tool_call_ids: Vec::new(),
        }
    }

    /// Build the assistant placeholder that hosts a single tool call.
    pub fn tool_call(id: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            created_at: Utc::now(),
            text_parts: Vec::new(),
            tool_call_ids: vec![tool_call_id.into()],
        }
    }

    /// All text parts joined.
    pub fn joined_text(&self) -> String {
        self.text_parts.concat()
    }

    /// Whether this message carries tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_call_ids.is_empty()
    }
}

/// Lifecycle of a tool call.
///
/// `Initializing → Running → {Complete, Error}`. Terminal states are sticky.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// Invocation parsed, no output yet.
    Initializing,
    /// At least one output chunk received.
    Running,
    /// Finished successfully.
    Complete,
    /// Finished with an error (including timeout and cancellation).
    Error,
}

impl ToolStatus {
    /// Whether the status can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// A parsed tool invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    /// Correlation id of the invocation.
    pub id: String,
    /// Tool name from the `Tool:` line.
    pub name: String,
    /// Arguments object from the `Arguments:` line.
    pub arguments: Value,
    /// The payload the invocation was parsed from.
    pub raw_text: String,
}

/// Live state of one tool call, owned by the tracker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallState {
    /// Correlation id.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Parsed arguments.
    pub arguments: Value,
    /// Current lifecycle state.
    pub status: ToolStatus,
    /// Accumulated output, if any arrived.
    pub output: Option<String>,
    /// Failure reason when `status` is `Error`.
    pub error: Option<String>,
}

impl ToolCallState {
    /// Fresh state for a newly started invocation.
    pub fn from_invocation(invocation: &ToolInvocation) -> Self {
        Self {
            id: invocation.id.clone(),
            name: invocation.name.clone(),
            arguments: invocation.arguments.clone(),
            status: ToolStatus::Initializing,
            output: None,
            error: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
