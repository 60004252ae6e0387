//! Plain-text rendering of a [`TranscriptSnapshot`].

use std::fmt::Write as _;

use convo_core::messages::{Message, Role, ToolCallState, ToolStatus};
use convo_core::text::truncate_with_suffix;
use convo_stream::TranscriptSnapshot;

/// Longest tool output shown inline.
const MAX_TOOL_OUTPUT: usize = 2000;

/// Longest argument summary shown on the tool header line.
const MAX_ARGUMENTS: usize = 200;

/// Render every message and the tool calls it references.
pub fn render_transcript(snapshot: &TranscriptSnapshot) -> String {
    let mut out = String::new();
    for message in snapshot.messages.iter() {
        render_message(&mut out, snapshot, message);
    }
    out
}

fn render_message(out: &mut String, snapshot: &TranscriptSnapshot, message: &Message) {
    let text = message.joined_text();
    if !text.is_empty() {
        let _ = writeln!(out, "{}: {text}", role_label(message.role));
    }
    for id in &message.tool_call_ids {
        match snapshot.tool_call(id) {
            Some(call) => render_tool(out, call),
            None => {
                let _ = writeln!(out, "  [tool {id}: unknown]");
            }
        }
    }
}

fn render_tool(out: &mut String, call: &ToolCallState) {
    let args = truncate_with_suffix(&call.arguments.to_string(), MAX_ARGUMENTS, "…");
    let _ = writeln!(out, "  [{} {}] {args}", call.name, status_label(call.status));
    if let Some(output) = call.output.as_deref().filter(|o| !o.is_empty()) {
        let output = truncate_with_suffix(output, MAX_TOOL_OUTPUT, "\n… (truncated)");
        for line in output.lines() {
            let _ = writeln!(out, "    {line}");
        }
    }
    if let Some(error) = &call.error {
        let _ = writeln!(out, "    error: {error}");
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "you",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

fn status_label(status: ToolStatus) -> &'static str {
    match status {
        ToolStatus::Initializing => "starting",
        ToolStatus::Running => "running",
        ToolStatus::Complete => "done",
        ToolStatus::Error => "failed",
    }
}
