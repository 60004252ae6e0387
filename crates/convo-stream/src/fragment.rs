//! # Fragment Buffer
//!
//! Producers may split one logical payload across several records that share
//! an id. The buffer concatenates them per `(id, kind)` until a
//! [`CompletionPredicate`] accepts the payload, then releases it as a single
//! [`RawEvent`]. Records without an id are never buffered.
//!
//! Tool output for an id whose invocation is still being reassembled is held
//! back and released directly after that invocation, so the tracker always
//! sees a tool start before its output.

use std::collections::HashMap;

use tracing::{debug, warn};

use convo_core::events::{CompletionSignal, EventKind, RawEvent};
use convo_settings::{CompletionMode, StreamSettings};

use crate::tool_parsing::is_settled_invocation;

/// Decides whether an accumulated payload is complete.
pub trait CompletionPredicate: Send + Sync {
    /// `true` when `payload` of `kind` can be released.
    fn is_complete(&self, kind: &EventKind, payload: &str) -> bool;
}

/// Parse-based completion.
///
/// Tool payloads are complete once no further fragment can change how they
/// parse (valid or not). Every other kind is a self-contained snapshot and
/// completes immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParseCompletion;

impl CompletionPredicate for ParseCompletion {
    fn is_complete(&self, kind: &EventKind, payload: &str) -> bool {
        match kind {
            EventKind::Tool => is_settled_invocation(payload),
            _ => true,
        }
    }
}

/// Terminal-character completion.
///
/// Tool payloads complete on a trailing `}`; other payloads complete when
/// they end in one of the configured characters.
#[derive(Clone, Debug)]
pub struct TerminalCharCompletion {
    terminals: Vec<char>,
}

impl TerminalCharCompletion {
    /// Create with the given terminal characters.
    pub fn new(terminals: &str) -> Self {
        Self {
            terminals: terminals.chars().collect(),
        }
    }
}

impl CompletionPredicate for TerminalCharCompletion {
    fn is_complete(&self, kind: &EventKind, payload: &str) -> bool {
        let Some(last) = payload.trim_end_matches([' ', '\t']).chars().last() else {
            return false;
        };
        match kind {
            EventKind::Tool => last == '}',
            _ => self.terminals.contains(&last),
        }
    }
}

/// Build the predicate selected by settings.
pub fn predicate_for(settings: &StreamSettings) -> Box<dyn CompletionPredicate> {
    match settings.completion {
        CompletionMode::Parse => Box::new(ParseCompletion),
        CompletionMode::TerminalChar => Box::new(TerminalCharCompletion::new(&settings.terminal_chars)),
    }
}

#[derive(Debug)]
struct Pending {
    payload: String,
    signal: Option<CompletionSignal>,
    seq: u64,
}

/// Keyed accumulator for partial payloads.
pub struct FragmentBuffer {
    pending: HashMap<(String, EventKind), Pending>,
    held: HashMap<String, Vec<RawEvent>>,
    predicate: Box<dyn CompletionPredicate>,
    max_bytes: usize,
    next_seq: u64,
}

impl std::fmt::Debug for FragmentBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentBuffer")
            .field("pending", &self.pending.len())
            .field("held", &self.held.len())
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

impl Default for FragmentBuffer {
    fn default() -> Self {
        Self::new(Box::new(ParseCompletion), StreamSettings::default().max_fragment_bytes)
    }
}

impl FragmentBuffer {
    /// Create a buffer with an explicit predicate and per-entry byte cap.
    pub fn new(predicate: Box<dyn CompletionPredicate>, max_bytes: usize) -> Self {
        Self {
            pending: HashMap::new(),
            held: HashMap::new(),
            predicate,
            max_bytes,
            next_seq: 0,
        }
    }

    /// Create a buffer configured from settings.
    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self::new(predicate_for(settings), settings.max_fragment_bytes)
    }

    /// Accumulate `event`; return whatever it releases, in delivery order.
    ///
    /// An explicit completion signal releases the entry regardless of the
    /// predicate. Entries that outgrow the byte cap are released as-is. A
    /// released tool invocation is followed by any output held for its id.
    pub fn ingest(&mut self, event: RawEvent) -> Vec<RawEvent> {
        match self.accumulate(event) {
            Some(released) => self.sequence(released),
            None => Vec::new(),
        }
    }

    /// Release everything still pending, in first-arrival order.
    pub fn flush(&mut self) -> Vec<RawEvent> {
        let mut entries: Vec<_> = self.pending.drain().collect();
        entries.sort_by_key(|(_, p)| p.seq);

        let mut released = Vec::with_capacity(entries.len());
        for (key, pending) in entries {
            released.extend(self.sequence(assemble(key, pending)));
        }
        let mut orphans: Vec<_> = self.held.drain().collect();
        orphans.sort_by(|a, b| a.0.cmp(&b.0));
        released.extend(orphans.into_iter().flat_map(|(_, events)| events));
        released
    }

    /// Discard everything pending or held. Returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending_len();
        self.pending.clear();
        self.held.clear();
        dropped
    }

    /// Number of pending entries, held output included.
    pub fn pending_len(&self) -> usize {
        self.pending.len() + self.held.values().map(Vec::len).sum::<usize>()
    }

    /// Whether anything is pending or held for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.held.contains_key(id) || self.pending.keys().any(|(k, _)| k == id)
    }

    fn accumulate(&mut self, event: RawEvent) -> Option<RawEvent> {
        let Some(id) = event.id else {
            return Some(event);
        };
        let key = (id, event.kind);

        let next_seq = &mut self.next_seq;
        let entry = self.pending.entry(key.clone()).or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            Pending {
                payload: String::new(),
                signal: None,
                seq,
            }
        });
        entry.payload.push_str(&event.payload);
        if event.signal.is_some() {
            entry.signal = event.signal;
        }

        let complete = entry.signal.is_some() || self.predicate.is_complete(&key.1, &entry.payload);
        let oversized = entry.payload.len() > self.max_bytes;
        if !complete && !oversized {
            debug!(id = %key.0, kind = %key.1, buffered = entry.payload.len(), "fragment buffered");
            return None;
        }
        if oversized && !complete {
            warn!(
                id = %key.0,
                kind = %key.1,
                bytes = entry.payload.len(),
                max_bytes = self.max_bytes,
                "fragment exceeded size cap, releasing incomplete"
            );
        }

        let pending = self.pending.remove(&key)?;
        Some(assemble(key, pending))
    }

    /// Order a released event against the invocation it may depend on.
    fn sequence(&mut self, event: RawEvent) -> Vec<RawEvent> {
        let Some(id) = event.id.clone() else {
            return vec![event];
        };
        match event.kind {
            EventKind::ToolOutput if self.pending.contains_key(&(id.clone(), EventKind::Tool)) => {
                debug!(%id, "holding tool output until its invocation completes");
                self.held.entry(id).or_default().push(event);
                Vec::new()
            }
            EventKind::Tool => {
                let mut released = vec![event];
                released.extend(self.held.remove(&id).unwrap_or_default());
                released
            }
            _ => vec![event],
        }
    }
}

fn assemble((id, kind): (String, EventKind), pending: Pending) -> RawEvent {
    RawEvent {
        id: Some(id),
        kind,
        payload: pending.payload,
        signal: pending.signal,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
