//! # Stream Session Controller
//!
//! Owns the lifetime of one transport stream: reads chunks with a bounded
//! inactivity window, honours cancellation, feeds the [`StreamEngine`] and
//! publishes a [`TranscriptSnapshot`] after every applied chunk.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use convo_core::errors::StreamError;
use convo_settings::StreamSettings;

use crate::engine::{StreamEngine, TranscriptSnapshot};

/// How a streaming session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Transport closed cleanly or the end marker arrived.
    Completed,
    /// No bytes arrived within the inactivity window.
    TimedOut,
    /// The cancellation token fired.
    Cancelled,
    /// The transport failed mid-stream.
    TransportFailed(String),
    /// The server reported an error in-band.
    ServerError(String),
}

impl StreamOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
            Self::TransportFailed(_) => "transport_failed",
            Self::ServerError(_) => "server_error",
        }
    }

    /// User-visible banner for failed sessions.
    pub fn banner(&self, inactivity: Duration) -> Option<String> {
        let err = match self {
            Self::Completed | Self::Cancelled => return None,
            Self::TimedOut => StreamError::Timeout {
                idle_ms: u64::try_from(inactivity.as_millis()).unwrap_or(u64::MAX),
            },
            Self::TransportFailed(msg) => StreamError::Transport(msg.clone()),
            Self::ServerError(msg) => StreamError::Server(msg.clone()),
        };
        err.banner()
    }
}

impl fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Drives a [`StreamEngine`] from a byte stream.
pub struct StreamController {
    engine: StreamEngine,
    inactivity: Duration,
    cancel: CancellationToken,
    updates: watch::Sender<TranscriptSnapshot>,
}

impl StreamController {
    /// Wrap `engine` with the given inactivity window.
    pub fn new(engine: StreamEngine, inactivity: Duration) -> Self {
        let (updates, _) = watch::channel(engine.snapshot());
        Self {
            engine,
            inactivity,
            cancel: CancellationToken::new(),
            updates,
        }
    }

    /// Build an engine and controller from settings.
    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self::new(
            StreamEngine::new(settings),
            Duration::from_millis(settings.inactivity_timeout_ms),
        )
    }

    /// Receive a snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<TranscriptSnapshot> {
        self.updates.subscribe()
    }

    /// Token that cancels the running stream when fired.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Configured inactivity window.
    pub fn inactivity(&self) -> Duration {
        self.inactivity
    }

    /// The engine.
    pub fn engine(&self) -> &StreamEngine {
        &self.engine
    }

    /// Mutable engine access between streams (user turns, resets).
    pub fn engine_mut(&mut self) -> &mut StreamEngine {
        &mut self.engine
    }

    /// Consume the controller, returning the engine.
    pub fn into_engine(self) -> StreamEngine {
        self.engine
    }

    /// Consume `stream` until it ends, fails, idles out or is cancelled.
    ///
    /// A cancelled controller stays cancelled; later calls return
    /// [`StreamOutcome::Cancelled`] immediately after failing in-flight tools.
    pub async fn run<S, E>(&mut self, mut stream: S) -> StreamOutcome
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: fmt::Display,
    {
        let outcome = loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                next = tokio::time::timeout(self.inactivity, stream.next()) => Some(next),
            };

            let Some(next) = next else {
                let _ = self.engine.cancel();
                break StreamOutcome::Cancelled;
            };

            match next {
                Err(_elapsed) => {
                    warn!(idle_ms = self.inactivity.as_millis(), "stream idle, closing");
                    let _ = self.engine.time_out();
                    break StreamOutcome::TimedOut;
                }
                Ok(None) => break self.finish(),
                Ok(Some(Err(e))) => {
                    let msg = e.to_string();
                    warn!(error = %msg, "transport failed mid-stream");
                    let _ = self.engine.fail(&msg);
                    break StreamOutcome::TransportFailed(msg);
                }
                Ok(Some(Ok(chunk))) => match self.engine.feed(&chunk) {
                    Ok(report) => {
                        debug!(bytes = chunk.len(), frames = report.frames, applied = report.applied, "chunk applied");
                        if report.applied > 0 {
                            self.publish();
                        }
                        if report.done {
                            break self.finish();
                        }
                    }
                    Err(e) => break self.server_error(&e),
                },
            }
        };

        self.publish();
        metrics::counter!("stream_sessions_total", "outcome" => outcome.label()).increment(1);
        info!(outcome = %outcome, session_id = ?self.engine.session_id(), "stream ended");
        outcome
    }

    fn finish(&mut self) -> StreamOutcome {
        match self.engine.finish() {
            Ok(_) => StreamOutcome::Completed,
            Err(e) => self.server_error(&e),
        }
    }

    fn server_error(&mut self, err: &StreamError) -> StreamOutcome {
        let msg = match err {
            StreamError::Server(msg) => msg.clone(),
            other => other.to_string(),
        };
        let _ = self.engine.fail(&msg);
        StreamOutcome::ServerError(msg)
    }

    fn publish(&self) {
        let _ = self.updates.send_replace(self.engine.snapshot());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use convo_core::messages::ToolStatus;
    use futures::stream;

    type Chunk = Result<Bytes, std::io::Error>;

    fn chunks(lines: &[&str]) -> Vec<Chunk> {
        lines
            .iter()
            .map(|l| Ok(Bytes::from(format!("{l}\n"))))
            .collect()
    }

    fn controller() -> StreamController {
        StreamController::new(StreamEngine::default(), Duration::from_secs(60))
    }

    const TOOL: &str = r#"{"type":"tool","id":"t1","message":"Tool: k\nArguments: {}"}"#;

    #[tokio::test]
    async fn completes_on_clean_close() {
        let mut ctl = controller();
        let input = stream::iter(chunks(&[
            r#"{"type":"msg","id":"m1","message":"Hi"}"#,
            TOOL,
            r#"{"type":"tool_output","message":"ok"}"#,
        ]));
        assert_eq!(ctl.run(input).await, StreamOutcome::Completed);
        let snap = ctl.engine().snapshot();
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.tool_call("t1").unwrap().status, ToolStatus::Complete);
    }

    #[tokio::test]
    async fn done_marker_ends_stream_without_close() {
        let mut ctl = controller();
        let input = stream::iter(chunks(&[r#"{"type":"msg","id":"m1","message":"Hi"}"#, "data: [DONE]"]))
            .chain(stream::pending());
        assert_eq!(ctl.run(input).await, StreamOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn inactivity_times_out_and_fails_tools() {
        let mut ctl = StreamController::new(StreamEngine::default(), Duration::from_secs(5));
        let input = stream::iter(chunks(&[TOOL])).chain(stream::pending());
        let outcome = ctl.run(input).await;
        assert_eq!(outcome, StreamOutcome::TimedOut);
        let state = ctl.engine().tracker().get("t1").unwrap().clone();
        assert_eq!(state.status, ToolStatus::Error);
        assert!(outcome.banner(ctl.inactivity()).unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_terminal_for_late_output() {
        let mut ctl = StreamController::new(StreamEngine::default(), Duration::from_secs(5));
        let input = stream::iter(chunks(&[TOOL])).chain(stream::pending());
        assert_eq!(ctl.run(input).await, StreamOutcome::TimedOut);

        // output for the same tool arriving on a later stream does not revive it
        let late = stream::iter(chunks(&[r#"{"type":"tool_output","id":"t1","message":"late"}"#]));
        let _ = ctl.run(late).await;
        let state = ctl.engine().tracker().get("t1").unwrap();
        assert_eq!(state.status, ToolStatus::Error);
        assert!(state.output.is_none());
    }

    #[tokio::test]
    async fn cancellation_fails_tools() {
        let mut ctl = controller();
        let token = ctl.cancel_token();
        let input = stream::iter(chunks(&[TOOL])).chain(stream::pending());

        let run = ctl.run(input);
        let cancel = async {
            tokio::task::yield_now().await;
            token.cancel();
        };
        let (outcome, ()) = tokio::join!(run, cancel);

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert!(outcome.banner(Duration::from_secs(1)).is_none());
        let state = ctl.engine().tracker().get("t1").unwrap();
        assert_eq!(state.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn transport_error_fails_session() {
        let mut ctl = controller();
        let input = stream::iter(vec![
            Ok(Bytes::from(format!("{TOOL}\n"))),
            Err(std::io::Error::other("connection reset")),
        ]);
        let outcome = ctl.run(input).await;
        assert_eq!(outcome, StreamOutcome::TransportFailed("connection reset".into()));
        assert_eq!(
            ctl.engine().tracker().get("t1").unwrap().status,
            ToolStatus::Error
        );
        assert!(outcome.banner(ctl.inactivity()).unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn server_error_notice_ends_session() {
        let mut ctl = controller();
        let input = stream::iter(chunks(&[
            TOOL,
            r#"{"type":"system_message","id":"s","message":"ERROR: backend down"}"#,
            r#"{"type":"msg","id":"m9","message":"never applied"}"#,
        ]));
        let outcome = ctl.run(input).await;
        assert_eq!(outcome, StreamOutcome::ServerError("ERROR: backend down".into()));
        let snap = ctl.engine().snapshot();
        assert!(snap.messages.iter().all(|m| m.id != "m9"));
        assert_eq!(snap.tool_call("t1").unwrap().status, ToolStatus::Error);
    }

    #[tokio::test]
    async fn subscribers_see_final_snapshot() {
        let mut ctl = controller();
        let mut rx = ctl.subscribe();
        let input = stream::iter(chunks(&[r#"{"type":"msg","id":"m1","message":"Hi"}"#]));
        let _ = ctl.run(input).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().messages.len(), 1);
    }
}
