//! Tool-call tracker. Owns the state machine of every tool call in a thread.
//!
//! The table lives behind an `Arc` so renderers can hold a snapshot while the
//! engine keeps mutating (copy-on-write via [`Arc::make_mut`]).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use convo_core::errors::StreamError;
use convo_core::messages::{ToolCallState, ToolInvocation, ToolStatus};

/// Keyed tool-call state, in start order.
#[derive(Clone, Debug)]
pub struct ToolCallTracker {
    calls: Arc<HashMap<String, ToolCallState>>,
    order: Vec<String>,
    fresh_headers: Vec<String>,
}

impl ToolCallTracker {
    /// Create an empty tracker. Output chunks starting with one of
    /// `fresh_headers` replace the accumulated output instead of extending it.
    pub fn new(fresh_headers: Vec<String>) -> Self {
        Self {
            calls: Arc::new(HashMap::new()),
            order: Vec::new(),
            fresh_headers,
        }
    }

    /// Register an invocation. Returns `true` if the id was new.
    ///
    /// A repeated start for a known id only refreshes name and arguments,
    /// and only while the call is still initializing.
    pub fn start(&mut self, invocation: &ToolInvocation) -> bool {
        if let Some(existing) = self.calls.get(&invocation.id) {
            if existing.status == ToolStatus::Initializing
                && (existing.name != invocation.name || existing.arguments != invocation.arguments)
            {
                if let Some(state) = Arc::make_mut(&mut self.calls).get_mut(&invocation.id) {
                    state.name.clone_from(&invocation.name);
                    state.arguments = invocation.arguments.clone();
                }
                debug!(id = %invocation.id, "duplicate tool start refreshed invocation");
            }
            return false;
        }

        let _ = Arc::make_mut(&mut self.calls)
            .insert(invocation.id.clone(), ToolCallState::from_invocation(invocation));
        self.order.push(invocation.id.clone());
        debug!(id = %invocation.id, tool = %invocation.name, "tool call started");
        true
    }

    /// Append an output chunk. Moves `Initializing` to `Running`.
    pub fn append_output(&mut self, id: &str, chunk: &str) -> bool {
        let fresh = {
            let trimmed = chunk.trim_start();
            self.fresh_headers.iter().any(|h| trimmed.starts_with(h.as_str()))
        };
        self.update(id, "append_output", |state| {
            state.status = ToolStatus::Running;
            match &mut state.output {
                Some(output) if !fresh => output.push_str(chunk),
                output => *output = Some(chunk.to_owned()),
            }
        })
    }

    /// Mark a call complete.
    pub fn complete(&mut self, id: &str) -> bool {
        self.update(id, "complete", |state| state.status = ToolStatus::Complete)
    }

    /// Mark a call failed with `reason`.
    pub fn fail(&mut self, id: &str, reason: &str) -> bool {
        self.update(id, "fail", |state| {
            state.status = ToolStatus::Error;
            state.error = Some(reason.to_owned());
        })
    }

    /// Copy of the state for `id`.
    pub fn snapshot(&self, id: &str) -> Option<ToolCallState> {
        self.calls.get(id).cloned()
    }

    /// Borrow the state for `id`.
    pub fn get(&self, id: &str) -> Option<&ToolCallState> {
        self.calls.get(id)
    }

    /// Whether `id` was ever started.
    pub fn contains(&self, id: &str) -> bool {
        self.calls.contains_key(id)
    }

    /// Shared snapshot of the whole table.
    pub fn table(&self) -> Arc<HashMap<String, ToolCallState>> {
        Arc::clone(&self.calls)
    }

    /// Ids of non-terminal calls, in start order.
    pub fn in_flight(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.calls.get(*id).is_some_and(|s| !s.status.is_terminal()))
            .cloned()
            .collect()
    }

    /// Complete every non-terminal call. Returns how many changed.
    pub fn complete_in_flight(&mut self) -> usize {
        let ids = self.in_flight();
        ids.iter().filter(|id| self.complete(id)).count()
    }

    /// Fail every non-terminal call with `reason`. Returns how many changed.
    pub fn fail_in_flight(&mut self, reason: &str) -> usize {
        let ids = self.in_flight();
        ids.iter().filter(|id| self.fail(id, reason)).count()
    }

    /// Number of tracked calls.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Whether no call was ever started.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Forget every call.
    pub fn clear(&mut self) {
        self.calls = Arc::new(HashMap::new());
        self.order.clear();
    }

    fn update<F>(&mut self, id: &str, op: &str, apply: F) -> bool
    where
        F: FnOnce(&mut ToolCallState),
    {
        let status = match self.calls.get(id) {
            Some(state) => state.status,
            None => {
                let err = StreamError::CorrelationMiss { id: id.to_owned() };
                debug!(op, error = %err, "ignoring tool update");
                return false;
            }
        };
        if status.is_terminal() {
            debug!(op, id, ?status, "tool call already finished, ignoring");
            return false;
        }
        if let Some(state) = Arc::make_mut(&mut self.calls).get_mut(id) {
            apply(state);
        }
        true
    }
}

impl Default for ToolCallTracker {
    fn default() -> Self {
        Self::new(vec!["Found resources:".to_owned()])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
