//! # Chat Transport
//!
//! Opens one streaming chat request and hands back the raw response body as
//! a byte stream. Decoding happens downstream in the engine.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use convo_core::text::truncate_str;
use convo_settings::{AuthScheme, ClientSettings};

/// Transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection or body read failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// API key could not be encoded as a header value.
    #[error("invalid API key: {0}")]
    InvalidKey(String),
}

/// Streaming response body.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Body of one chat request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User message text.
    pub message: String,
    /// Teammate (agent) the conversation is with.
    pub agent_uuid: String,
    /// Session id from a previous `session_init`, if any.
    pub session_id: Option<String>,
}

/// Something that can open a streaming chat response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the response body as a byte stream.
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;
}

/// Longest error body kept in [`TransportError::Status`].
const MAX_ERROR_BODY: usize = 1024;

/// [`Transport`] over HTTP POST with a streamed response body.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    auth_scheme: AuthScheme,
    api_key: Option<String>,
}

impl HttpTransport {
    /// Build from client settings. The API key is read from the env var
    /// named by `api_key_env`.
    pub fn new(settings: &ClientSettings) -> Result<Self, TransportError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        Self::with_api_key(settings, api_key)
    }

    /// Build with an explicit API key.
    pub fn with_api_key(
        settings: &ClientSettings,
        api_key: Option<String>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            auth_scheme: settings.auth_scheme,
            api_key,
        })
    }

    /// Configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_headers(&self) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        if let Some(key) = &self.api_key {
            let value = format!("{} {key}", self.auth_scheme.prefix());
            let value = HeaderValue::from_str(&value)
                .map_err(|e| TransportError::InvalidKey(e.to_string()))?;
            let _ = headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        debug!(
            endpoint = %self.endpoint,
            agent_uuid = %request.agent_uuid,
            has_session = request.session_id.is_some(),
            "opening chat stream"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.build_headers()?)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        metrics::counter!("transport_requests_total", "status" => status.as_u16().to_string())
            .increment(1);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "chat request rejected");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate_str(&body, MAX_ERROR_BODY).to_owned(),
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::Http))
            .boxed())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ClientSettings {
        ClientSettings {
            endpoint: "http://localhost:1/api/converse".into(),
            ..ClientSettings::default()
        }
    }

    #[test]
    fn headers_without_key() {
        let transport = HttpTransport::with_api_key(&settings(), None).unwrap();
        let headers = transport.build_headers().unwrap();
        assert_eq!(headers[ACCEPT], "text/event-stream");
        assert!(!headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn headers_with_userkey_scheme() {
        let s = ClientSettings {
            auth_scheme: AuthScheme::Userkey,
            ..settings()
        };
        let transport = HttpTransport::with_api_key(&s, Some("k-123".into())).unwrap();
        let headers = transport.build_headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "userkey k-123");
    }

    #[test]
    fn rejects_unencodable_key() {
        let transport = HttpTransport::with_api_key(&settings(), Some("bad\nkey".into())).unwrap();
        assert!(matches!(
            transport.build_headers(),
            Err(TransportError::InvalidKey(_))
        ));
    }

    #[test]
    fn request_serializes_wire_names() {
        let req = ChatRequest {
            message: "hi".into(),
            agent_uuid: "a-1".into(),
            session_id: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"message": "hi", "agent_uuid": "a-1", "session_id": null})
        );
    }
}
