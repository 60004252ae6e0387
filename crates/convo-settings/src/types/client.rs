//! Client and logging settings.

use serde::{Deserialize, Serialize};

/// How the API key is presented in the `Authorization` header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    #[default]
    Bearer,
    /// `Authorization: userkey <key>`
    Userkey,
}

impl AuthScheme {
    /// Header value prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Bearer => "Bearer",
            Self::Userkey => "userkey",
        }
    }
}

/// Outbound HTTP client settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Streaming chat endpoint.
    pub endpoint: String,
    /// Authorization scheme.
    pub auth_scheme: AuthScheme,
    /// Name of the env var holding the API key.
    pub api_key_env: String,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Session state file. Defaults to `~/.convo/state.json` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_path: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/converse".to_string(),
            auth_scheme: AuthScheme::Bearer,
            api_key_env: "CONVO_API_KEY".to_string(),
            connect_timeout_ms: 10_000,
            state_path: None,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`RUST_LOG` takes precedence).
    pub level: String,
    /// `compact` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_prefixes() {
        assert_eq!(AuthScheme::Bearer.prefix(), "Bearer");
        assert_eq!(AuthScheme::Userkey.prefix(), "userkey");
    }

    #[test]
    fn state_path_omitted_when_unset() {
        let v = serde_json::to_value(ClientSettings::default()).unwrap();
        assert!(v.get("statePath").is_none());
        assert_eq!(v["authScheme"], "bearer");
    }
}
