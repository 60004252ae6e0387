//! Error taxonomy for stream processing.
//!
//! Event-level failures ([`StreamError::Decode`], [`StreamError::Classification`],
//! [`StreamError::CorrelationMiss`]) are recovered where they happen and only
//! logged. The remaining variants end the streaming session and are shown to
//! the user as a banner.

use thiserror::Error;

/// Errors raised while turning a transport stream into a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A record could not be decoded. The record is dropped.
    #[error("malformed record: {reason}")]
    Decode {
        /// Parser message.
        reason: String,
        /// Truncated copy of the offending line.
        preview: String,
    },

    /// A completed record did not match its kind's grammar.
    #[error("cannot classify {kind} record: {reason}")]
    Classification {
        /// Wire tag of the record.
        kind: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A tool operation named an id the tracker has never seen.
    #[error("no tool call with id {id}")]
    CorrelationMiss {
        /// The unknown id.
        id: String,
    },

    /// No bytes arrived within the inactivity window.
    #[error("stream idle for {idle_ms}ms")]
    Timeout {
        /// Configured inactivity window.
        idle_ms: u64,
    },

    /// The transport failed mid-stream.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The server reported an error in-band.
    #[error("{0}")]
    Server(String),
}

impl StreamError {
    /// Whether this error ends the streaming session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transport(_) | Self::Server(_)
        )
    }

    /// User-facing banner text for session-ending errors.
    pub fn banner(&self) -> Option<String> {
        match self {
            Self::Timeout { .. } => {
                Some("The response timed out. Please try again.".to_owned())
            }
            Self::Transport(msg) => Some(format!("Connection lost: {msg}")),
            Self::Server(msg) => Some(msg.clone()),
            _ => None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, StreamError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
