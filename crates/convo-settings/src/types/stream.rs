//! Stream reconciliation settings.

use serde::{Deserialize, Serialize};

/// How the fragment buffer decides a payload is complete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompletionMode {
    /// Tool payloads are complete once their arguments parse as JSON.
    #[default]
    Parse,
    /// Payloads are complete when they end in one of `terminalChars`.
    TerminalChar,
}

/// Settings for the streaming engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    /// Close the stream when no bytes arrive for this long.
    pub inactivity_timeout_ms: u64,
    /// Upper bound for one buffered fragment before it is force-released.
    pub max_fragment_bytes: usize,
    /// Completion predicate used by the fragment buffer.
    pub completion: CompletionMode,
    /// Terminal characters for [`CompletionMode::TerminalChar`].
    pub terminal_chars: String,
    /// Output headers that start a fresh output block instead of appending.
    pub fresh_output_headers: Vec<String>,
    /// Marker opening a warning segment in system messages.
    pub warning_marker: String,
    /// Marker opening an error segment in system messages.
    pub error_marker: String,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: 60_000,
            max_fragment_bytes: 1_048_576,
            completion: CompletionMode::Parse,
            terminal_chars: ".!?}\n".to_string(),
            fresh_output_headers: vec!["Found resources:".to_string()],
            warning_marker: "WARNING:".to_string(),
            error_marker: "ERROR:".to_string(),
        }
    }
}
