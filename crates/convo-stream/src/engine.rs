//! # Stream Engine
//!
//! Synchronous wiring of decoder → fragment buffer → classifier →
//! {tracker, transcript}. One engine per conversation; it owns every piece of
//! per-session state and is driven by a single writer.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use convo_core::errors::StreamError;
use convo_core::events::{ClassifiedEvent, EventKind, RawEvent};
use convo_core::ids::SessionId;
use convo_core::messages::{Message, ToolCallState};
use convo_settings::StreamSettings;

use crate::classifier::Classifier;
use crate::decoder::{EventDecoder, Frame};
use crate::fragment::FragmentBuffer;
use crate::tracker::ToolCallTracker;
use crate::transcript::{ApplyOutcome, LocalIds, TranscriptStore};

/// Immutable view handed to renderers.
#[derive(Clone, Debug, Default)]
pub struct TranscriptSnapshot {
    /// Ordered messages.
    pub messages: Arc<Vec<Message>>,
    /// Tool-call table keyed by id.
    pub tool_calls: Arc<HashMap<String, ToolCallState>>,
    /// Server-assigned session id, once announced.
    pub session_id: Option<SessionId>,
}

impl TranscriptSnapshot {
    /// Look up a tool call referenced by a message.
    pub fn tool_call(&self, id: &str) -> Option<&ToolCallState> {
        self.tool_calls.get(id)
    }
}

/// Counters for one [`StreamEngine::feed`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedReport {
    /// Frames decoded.
    pub frames: usize,
    /// Events that changed the transcript or tool state.
    pub applied: usize,
    /// The producer sent its end-of-stream marker.
    pub done: bool,
}

/// Per-conversation reconciliation state.
#[derive(Debug)]
pub struct StreamEngine {
    decoder: EventDecoder,
    buffer: FragmentBuffer,
    classifier: Classifier,
    store: TranscriptStore,
    tracker: ToolCallTracker,
    ids: LocalIds,
    session_id: Option<SessionId>,
}

impl Default for StreamEngine {
    fn default() -> Self {
        Self::new(&StreamSettings::default())
    }
}

impl StreamEngine {
    /// Create an engine configured from settings.
    pub fn new(settings: &StreamSettings) -> Self {
        Self::with_buffer(settings, FragmentBuffer::from_settings(settings))
    }

    /// Create an engine with a caller-supplied fragment buffer.
    pub fn with_buffer(settings: &StreamSettings, buffer: FragmentBuffer) -> Self {
        Self {
            decoder: EventDecoder::new(),
            buffer,
            classifier: Classifier::from_settings(settings),
            store: TranscriptStore::new(),
            tracker: ToolCallTracker::new(settings.fresh_output_headers.clone()),
            ids: LocalIds::default(),
            session_id: None,
        }
    }

    /// Server-assigned session id, once known.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Restore a previously persisted session id.
    pub fn set_session_id(&mut self, session_id: Option<SessionId>) {
        self.session_id = session_id;
    }

    /// Append the user's message and start a new turn. Returns its id.
    pub fn push_user(&mut self, text: &str) -> String {
        let id = self.ids.next_id();
        self.store.push_user(id.clone(), text);
        id
    }

    /// Decode and apply one transport chunk.
    ///
    /// Event-level problems are logged and skipped. An in-band server error
    /// (an error record, or a system message opening with the error marker)
    /// is applied and then returned as [`StreamError::Server`].
    pub fn feed(&mut self, chunk: &[u8]) -> Result<FeedReport, StreamError> {
        let frames = self.decoder.push(chunk);
        self.apply_frames(frames)
    }

    /// Apply one already-decoded event.
    ///
    /// A completed invocation may release held output along with it; the
    /// returned outcome covers everything released.
    pub fn feed_event(&mut self, event: RawEvent) -> Result<ApplyOutcome, StreamError> {
        let mut outcome = ApplyOutcome::Ignored;
        for released in self.buffer.ingest(event) {
            outcome = outcome.merge(self.route(released)?);
        }
        Ok(outcome)
    }

    /// The transport closed cleanly.
    ///
    /// Decodes any trailing partial line, releases pending fragments in
    /// arrival order and completes every tool still in flight.
    pub fn finish(&mut self) -> Result<FeedReport, StreamError> {
        let frames = self.decoder.finish();
        let mut report = self.apply_frames(frames)?;

        for event in self.buffer.flush() {
            debug!(id = ?event.id, kind = %event.kind, "releasing fragment at stream end");
            if self.route(event)?.is_change() {
                report.applied += 1;
            }
        }

        let completed = self.tracker.complete_in_flight();
        self.store.clear_active_tool();
        debug!(completed, "stream finished");
        Ok(report)
    }

    /// No bytes arrived within the inactivity window.
    ///
    /// In-flight tools are failed, then pending fragments are surfaced as
    /// they stand.
    pub fn time_out(&mut self) -> usize {
        self.end_abnormally("timed out")
    }

    /// The session ended abnormally (transport failure or server error).
    pub fn fail(&mut self, reason: &str) -> usize {
        self.end_abnormally(reason)
    }

    /// The user cancelled the stream.
    pub fn cancel(&mut self) -> usize {
        self.abort("cancelled")
    }

    /// Discard thread, tool state, buffers, counters and session identity.
    pub fn reset(&mut self) {
        self.decoder.clear();
        let _ = self.buffer.clear();
        self.store.reset();
        self.tracker.clear();
        self.ids.reset();
        self.session_id = None;
    }

    /// Current view for renderers.
    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            messages: self.store.snapshot(),
            tool_calls: self.tracker.table(),
            session_id: self.session_id.clone(),
        }
    }

    /// Read access to the tool-call tracker.
    pub fn tracker(&self) -> &ToolCallTracker {
        &self.tracker
    }

    /// Read access to the transcript store.
    pub fn store(&self) -> &TranscriptStore {
        &self.store
    }

    /// Number of fragments waiting for completion.
    pub fn pending_fragments(&self) -> usize {
        self.buffer.pending_len()
    }

    fn end_abnormally(&mut self, reason: &str) -> usize {
        self.decoder.clear();
        let mut failed = self.tracker.fail_in_flight(reason);
        self.store.clear_active_tool();

        let released = self.buffer.flush();
        let count = released.len();
        for event in released {
            debug!(id = ?event.id, kind = %event.kind, "releasing fragment on abnormal end");
            if let Err(err) = self.route(event) {
                warn!(error = %err, "released fragment carried a server error");
            }
        }
        // a released fragment may itself start a tool
        failed += self.tracker.fail_in_flight(reason);
        self.store.clear_active_tool();

        info!(reason, released_fragments = count, failed_tools = failed, "stream ended abnormally");
        failed
    }

    fn abort(&mut self, reason: &str) -> usize {
        self.decoder.clear();
        let dropped = self.buffer.clear();
        let failed = self.tracker.fail_in_flight(reason);
        self.store.clear_active_tool();
        info!(reason, dropped_fragments = dropped, failed_tools = failed, "stream aborted");
        failed
    }

    fn apply_frames(&mut self, frames: Vec<Frame>) -> Result<FeedReport, StreamError> {
        let mut report = FeedReport {
            frames: frames.len(),
            ..FeedReport::default()
        };
        for frame in frames {
            match frame {
                Frame::Event(event) => {
                    if self.feed_event(event)?.is_change() {
                        report.applied += 1;
                    }
                }
                Frame::Done => report.done = true,
                Frame::ServerError(msg) => {
                    warn!(error = %msg, "server reported an error");
                    return Err(StreamError::Server(msg));
                }
            }
        }
        Ok(report)
    }

    fn route(&mut self, mut event: RawEvent) -> Result<ApplyOutcome, StreamError> {
        if event.id.is_none() && !matches!(event.kind, EventKind::ToolOutput | EventKind::SessionInit) {
            event.id = Some(self.ids.next_id());
        }

        let classified = self.classifier.classify(event, self.store.active_tool_id());
        let server_error = match &classified {
            ClassifiedEvent::SessionInit { session_id } => {
                info!(session_id = %session_id, "session identified");
                self.session_id = Some(SessionId::from(session_id.as_str()));
                return Ok(ApplyOutcome::Ignored);
            }
            ClassifiedEvent::SystemNotice { notices, .. } if Classifier::is_error_report(notices) => {
                Some(notices[0].text.clone())
            }
            _ => None,
        };
        if let Some(msg) = &server_error {
            let _ = self.tracker.fail_in_flight(msg);
        }

        let outcome = self.store.apply(classified, &mut self.tracker, &mut self.ids);
        match server_error {
            Some(msg) => Err(StreamError::Server(msg)),
            None => Ok(outcome),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
