//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial JSON
//! is accepted and missing fields get their [`Default`] value.

mod client;
mod stream;

pub use client::*;
pub use stream::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "stream": { "inactivityTimeoutMs": 30000, "completion": "terminalChar" },
///   "client": { "endpoint": "https://chat.example.com/api/converse" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConvoSettings {
    /// Settings schema version.
    pub version: String,
    /// Stream reconciliation settings.
    pub stream: StreamSettings,
    /// Outbound HTTP client settings.
    pub client: ClientSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for ConvoSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            stream: StreamSettings::default(),
            client: ClientSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ConvoSettings {
    /// Reject combinations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let stream = &self.stream;
        if stream.inactivity_timeout_ms == 0 {
            return Err(SettingsError::invalid("stream.inactivityTimeoutMs", "must be greater than 0"));
        }
        if stream.max_fragment_bytes == 0 {
            return Err(SettingsError::invalid("stream.maxFragmentBytes", "must be greater than 0"));
        }
        if stream.warning_marker.is_empty() {
            return Err(SettingsError::invalid("stream.warningMarker", "must not be empty"));
        }
        if stream.error_marker.is_empty() {
            return Err(SettingsError::invalid("stream.errorMarker", "must not be empty"));
        }
        if stream.completion == CompletionMode::TerminalChar && stream.terminal_chars.is_empty() {
            return Err(SettingsError::invalid(
                "stream.terminalChars",
                "must not be empty in terminalChar mode",
            ));
        }
        if self.client.endpoint.trim().is_empty() {
            return Err(SettingsError::invalid("client.endpoint", "must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_are_valid() {
        ConvoSettings::default().validate().unwrap();
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut s = ConvoSettings::default();
        s.stream.inactivity_timeout_ms = 0;
        assert_matches!(
            s.validate(),
            Err(SettingsError::Invalid { field: "stream.inactivityTimeoutMs", .. })
        );
    }

    #[test]
    fn terminal_mode_needs_chars() {
        let mut s = ConvoSettings::default();
        s.stream.completion = CompletionMode::TerminalChar;
        s.stream.terminal_chars = String::new();
        assert_matches!(
            s.validate(),
            Err(SettingsError::Invalid { field: "stream.terminalChars", .. })
        );
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(ConvoSettings::default()).unwrap();
        assert!(v["stream"].get("inactivityTimeoutMs").is_some());
        assert!(v["client"].get("authScheme").is_some());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: ConvoSettings =
            serde_json::from_str(r#"{"stream": {"maxFragmentBytes": 2048}}"#).unwrap();
        assert_eq!(s.stream.max_fragment_bytes, 2048);
        assert_eq!(s.stream.inactivity_timeout_ms, 60_000);
        assert_eq!(s.logging.level, "warn");
    }
}
