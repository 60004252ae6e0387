//! # Transcript Store
//!
//! Ordered, append-only message history for the active thread. Text events
//! with an id already seen in the current turn replace that message's text;
//! everything else appends. The message list is shared with renderers through
//! `Arc` snapshots and cloned only when a snapshot is still held.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use convo_core::events::{ClassifiedEvent, CompletionSignal};
use convo_core::ids::ThreadId;
use convo_core::messages::{Message, Role};

use crate::tracker::ToolCallTracker;

/// One conversation.
#[derive(Clone, Debug)]
pub struct Thread {
    /// Local thread identity.
    pub id: ThreadId,
    /// Ordered messages.
    pub messages: Arc<Vec<Message>>,
    /// Tool currently receiving uncorrelated output.
    pub active_tool_id: Option<String>,
}

impl Default for Thread {
    fn default() -> Self {
        Self {
            id: ThreadId::new(),
            messages: Arc::new(Vec::new()),
            active_tool_id: None,
        }
    }
}

/// Generator of fallback ids (`local-<n>`) for records that carry none.
#[derive(Clone, Debug, Default)]
pub struct LocalIds {
    next: u64,
}

impl LocalIds {
    /// Next unused id.
    pub fn next_id(&mut self) -> String {
        self.next += 1;
        format!("local-{}", self.next)
    }

    /// Restart numbering.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// What [`TranscriptStore::apply`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// New messages were appended.
    Appended(usize),
    /// An existing message's text was replaced.
    Replaced,
    /// The event matched current state exactly.
    Unchanged,
    /// Only tool-call state changed.
    ToolUpdated,
    /// Output with no known tool was surfaced as a system message.
    Orphaned,
    /// Nothing to apply.
    Ignored,
}

impl ApplyOutcome {
    /// Whether the visible transcript changed.
    pub fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged | Self::Ignored)
    }

    /// Combine outcomes of events applied together, keeping the strongest.
    pub(crate) fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Appended(a), Self::Appended(b)) => Self::Appended(a + b),
            (Self::Appended(a), _) | (_, Self::Appended(a)) => Self::Appended(a),
            (Self::Replaced, _) | (_, Self::Replaced) => Self::Replaced,
            (Self::Orphaned, _) | (_, Self::Orphaned) => Self::Orphaned,
            (Self::ToolUpdated, _) | (_, Self::ToolUpdated) => Self::ToolUpdated,
            (Self::Unchanged, _) | (_, Self::Unchanged) => Self::Unchanged,
            _ => Self::Ignored,
        }
    }
}

/// Append-only message history with a per-turn id index.
#[derive(Debug, Default)]
pub struct TranscriptStore {
    thread: Thread,
    text_index: HashMap<String, usize>,
}

impl TranscriptStore {
    /// Create an empty store with a fresh thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// The active thread.
    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    /// Shared snapshot of the message list.
    pub fn snapshot(&self) -> Arc<Vec<Message>> {
        Arc::clone(&self.thread.messages)
    }

    /// Tool currently receiving uncorrelated output.
    pub fn active_tool_id(&self) -> Option<&str> {
        self.thread.active_tool_id.as_deref()
    }

    /// Forget the active tool without changing its state.
    pub fn clear_active_tool(&mut self) {
        self.thread.active_tool_id = None;
    }

    /// Append the user's own message and start a new turn.
    pub fn push_user(&mut self, id: String, text: &str) {
        self.text_index.clear();
        self.thread.active_tool_id = None;
        Arc::make_mut(&mut self.thread.messages).push(Message::text(id, Role::User, text));
    }

    /// Discard the thread and start a new one.
    pub fn reset(&mut self) {
        let old = std::mem::take(&mut self.thread);
        self.text_index.clear();
        info!(thread_id = %old.id, new_thread_id = %self.thread.id, "transcript reset");
    }

    /// Apply a classified event.
    pub fn apply(
        &mut self,
        event: ClassifiedEvent,
        tracker: &mut ToolCallTracker,
        ids: &mut LocalIds,
    ) -> ApplyOutcome {
        match event {
            ClassifiedEvent::AssistantText { id, text } => {
                self.upsert_text(id, Role::Assistant, text, tracker)
            }
            ClassifiedEvent::SystemNotice { id, notices } => notices
                .into_iter()
                .enumerate()
                .map(|(i, notice)| {
                    let notice_id = if i == 0 { id.clone() } else { format!("{id}.{i}") };
                    self.upsert_text(notice_id, Role::System, notice.text, tracker)
                })
                .fold(ApplyOutcome::Ignored, ApplyOutcome::merge),
            ClassifiedEvent::ToolStart { id, invocation } => {
                if tracker.contains(&id) {
                    let _ = tracker.start(&invocation);
                    return ApplyOutcome::Unchanged;
                }
                self.close_active_tool(tracker);
                let _ = tracker.start(&invocation);
                Arc::make_mut(&mut self.thread.messages).push(Message::tool_call(id.clone(), id.clone()));
                self.thread.active_tool_id = Some(id);
                ApplyOutcome::Appended(1)
            }
            ClassifiedEvent::ToolOutput { id, text, signal } => {
                self.apply_tool_output(id, &text, signal, tracker, ids)
            }
            ClassifiedEvent::Unrecognized { id, raw, reason } => {
                if let Some(tool_id) = id.as_deref().filter(|tid| tracker.contains(tid)) {
                    let _ = tracker.fail(tool_id, &reason);
                    if self.active_tool_id() == Some(tool_id) {
                        self.clear_active_tool();
                    }
                }
                let id = id.unwrap_or_else(|| ids.next_id());
                debug!(%id, %reason, "appending unrecognized event as text");
                self.upsert_text(id, Role::Assistant, raw, tracker)
            }
            ClassifiedEvent::SessionInit { .. } => ApplyOutcome::Ignored,
        }
    }

    fn apply_tool_output(
        &mut self,
        id: Option<String>,
        text: &str,
        signal: Option<CompletionSignal>,
        tracker: &mut ToolCallTracker,
        ids: &mut LocalIds,
    ) -> ApplyOutcome {
        match id {
            Some(tool_id) if tracker.contains(&tool_id) => {
                if !text.is_empty() {
                    let _ = tracker.append_output(&tool_id, text);
                }
                let finished = match signal {
                    Some(CompletionSignal::Complete) => tracker.complete(&tool_id),
                    Some(CompletionSignal::Failed) => tracker.fail(&tool_id, "tool reported an error"),
                    None => false,
                };
                if finished && self.active_tool_id() == Some(tool_id.as_str()) {
                    self.clear_active_tool();
                }
                ApplyOutcome::ToolUpdated
            }
            other => {
                if text.trim().is_empty() {
                    return ApplyOutcome::Ignored;
                }
                metrics::counter!("stream_orphan_outputs_total").increment(1);
                debug!(id = ?other, "tool output has no matching tool call");
                let orphan_id = ids.next_id();
                Arc::make_mut(&mut self.thread.messages).push(Message::text(orphan_id, Role::System, text));
                ApplyOutcome::Orphaned
            }
        }
    }

    fn upsert_text(
        &mut self,
        id: String,
        role: Role,
        text: String,
        tracker: &mut ToolCallTracker,
    ) -> ApplyOutcome {
        if text.trim().is_empty() {
            return ApplyOutcome::Ignored;
        }

        if let Some(&idx) = self.text_index.get(&id) {
            if self.thread.messages[idx].text_parts.len() == 1
                && self.thread.messages[idx].text_parts[0] == text
            {
                return ApplyOutcome::Unchanged;
            }
            self.close_active_tool(tracker);
            Arc::make_mut(&mut self.thread.messages)[idx].text_parts = vec![text];
            return ApplyOutcome::Replaced;
        }

        self.close_active_tool(tracker);
        let messages = Arc::make_mut(&mut self.thread.messages);
        let _ = self.text_index.insert(id.clone(), messages.len());
        messages.push(Message::text(id, role, text));
        ApplyOutcome::Appended(1)
    }

    fn close_active_tool(&mut self, tracker: &mut ToolCallTracker) {
        if let Some(tool_id) = self.thread.active_tool_id.take() {
            let _ = tracker.complete(&tool_id);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
