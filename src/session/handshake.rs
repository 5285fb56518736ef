//! Session handshake — exchanges an agent id for connection credentials.
//!
//! One synchronous HTTP call before the duplex connection opens:
//!
//! ```text
//! POST handshake_url   {"agentId": "..."}
//!   →  {"connectionEndpoint": "wss://...", "audioConfig": {"sampleRate": 24000}}
//! ```
//!
//! The core treats this as a black box behind [`HandshakeClient`]; a
//! non-success status, a missing endpoint, or a missing sample rate is fatal
//! to session start.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AgentConfig;

// ---------------------------------------------------------------------------
// HandshakeError
// ---------------------------------------------------------------------------

/// Errors that can occur during the session handshake.
#[derive(Debug, Clone, Error)]
pub enum HandshakeError {
    /// HTTP transport or connection error.
    #[error("handshake request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("handshake timed out")]
    Timeout,

    /// The server answered with a non-success status.
    #[error("handshake rejected with status {0}")]
    Status(u16),

    /// The response body could not be parsed as JSON.
    #[error("failed to parse handshake response: {0}")]
    Parse(String),

    /// The response carried no connection endpoint.
    #[error("handshake response is missing the connection endpoint")]
    MissingEndpoint,

    /// The response carried no audio sample rate.
    #[error("handshake response is missing the audio sample rate")]
    MissingSampleRate,
}

impl From<reqwest::Error> for HandshakeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HandshakeError::Timeout
        } else {
            HandshakeError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// HandshakeResponse
// ---------------------------------------------------------------------------

/// The credentials a successful handshake returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// WebSocket endpoint for the duplex session connection.
    pub endpoint: String,
    /// Negotiated PCM sample rate in Hz.
    pub sample_rate: u32,
}

// ---------------------------------------------------------------------------
// HandshakeClient trait
// ---------------------------------------------------------------------------

/// Async seam for the handshake collaborator.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn HandshakeClient>`.
#[async_trait]
pub trait HandshakeClient: Send + Sync {
    /// Exchange `agent_id` for connection credentials.
    async fn negotiate(&self, agent_id: &str) -> Result<HandshakeResponse, HandshakeError>;
}

// ---------------------------------------------------------------------------
// HttpHandshake
// ---------------------------------------------------------------------------

/// Production handshake client over HTTP.
///
/// All connection details (`handshake_url`, timeout) come exclusively from
/// the [`AgentConfig`] passed to [`HttpHandshake::from_config`].
pub struct HttpHandshake {
    client: reqwest::Client,
    url: String,
}

impl HttpHandshake {
    /// Build an `HttpHandshake` from application config.
    ///
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.handshake_timeout_secs`.  A default (no-timeout) client is
    /// used as a last-resort fallback if the builder fails (should never
    /// happen in practice).
    pub fn from_config(config: &AgentConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.handshake_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            url: config.handshake_url.clone(),
        }
    }
}

/// Extract endpoint and sample rate from a handshake response body.
fn parse_response(json: &serde_json::Value) -> Result<HandshakeResponse, HandshakeError> {
    let endpoint = json["connectionEndpoint"]
        .as_str()
        .filter(|s| !s.is_empty())
        .ok_or(HandshakeError::MissingEndpoint)?
        .to_string();

    let sample_rate = json["audioConfig"]["sampleRate"]
        .as_u64()
        .filter(|&rate| rate > 0)
        .ok_or(HandshakeError::MissingSampleRate)? as u32;

    Ok(HandshakeResponse {
        endpoint,
        sample_rate,
    })
}

#[async_trait]
impl HandshakeClient for HttpHandshake {
    async fn negotiate(&self, agent_id: &str) -> Result<HandshakeResponse, HandshakeError> {
        let body = serde_json::json!({ "agentId": agent_id });

        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HandshakeError::Status(status.as_u16()));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| HandshakeError::Parse(e.to_string()))?;

        parse_response(&json)
    }
}

// ---------------------------------------------------------------------------
// MockHandshake  (test-only)
// ---------------------------------------------------------------------------

/// Test double returning a pre-configured handshake result.
#[cfg(test)]
pub struct MockHandshake {
    response: Result<HandshakeResponse, HandshakeError>,
}

#[cfg(test)]
impl MockHandshake {
    /// A mock that always succeeds with the given credentials.
    pub fn ok(endpoint: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            response: Ok(HandshakeResponse {
                endpoint: endpoint.into(),
                sample_rate,
            }),
        }
    }

    /// A mock that always fails.
    pub fn err(error: HandshakeError) -> Self {
        Self {
            response: Err(error),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl HandshakeClient for MockHandshake {
    async fn negotiate(&self, _agent_id: &str) -> Result<HandshakeResponse, HandshakeError> {
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_builds_without_panic() {
        let _client = HttpHandshake::from_config(&AgentConfig::default());
    }

    /// Verify that `HttpHandshake` is object-safe.
    #[test]
    fn handshake_client_is_object_safe() {
        let client: Box<dyn HandshakeClient> =
            Box::new(HttpHandshake::from_config(&AgentConfig::default()));
        drop(client);
    }

    // ---- parse_response ----------------------------------------------------

    #[test]
    fn parses_complete_response() {
        let json = serde_json::json!({
            "connectionEndpoint": "wss://agents.example.com/session/abc",
            "audioConfig": { "sampleRate": 24000 }
        });

        let parsed = parse_response(&json).unwrap();
        assert_eq!(parsed.endpoint, "wss://agents.example.com/session/abc");
        assert_eq!(parsed.sample_rate, 24_000);
    }

    #[test]
    fn missing_endpoint_is_fatal() {
        let json = serde_json::json!({ "audioConfig": { "sampleRate": 24000 } });
        let err = parse_response(&json).unwrap_err();
        assert!(matches!(err, HandshakeError::MissingEndpoint));
    }

    #[test]
    fn empty_endpoint_is_fatal() {
        let json = serde_json::json!({
            "connectionEndpoint": "",
            "audioConfig": { "sampleRate": 24000 }
        });
        let err = parse_response(&json).unwrap_err();
        assert!(matches!(err, HandshakeError::MissingEndpoint));
    }

    #[test]
    fn missing_sample_rate_is_fatal() {
        let json = serde_json::json!({ "connectionEndpoint": "wss://x" });
        let err = parse_response(&json).unwrap_err();
        assert!(matches!(err, HandshakeError::MissingSampleRate));
    }

    #[test]
    fn zero_sample_rate_is_fatal() {
        let json = serde_json::json!({
            "connectionEndpoint": "wss://x",
            "audioConfig": { "sampleRate": 0 }
        });
        let err = parse_response(&json).unwrap_err();
        assert!(matches!(err, HandshakeError::MissingSampleRate));
    }

    // ---- MockHandshake -----------------------------------------------------

    #[tokio::test]
    async fn mock_ok_returns_credentials() {
        let mock = MockHandshake::ok("wss://mock", 24_000);
        let response = mock.negotiate("agent-1").await.unwrap();
        assert_eq!(response.endpoint, "wss://mock");
        assert_eq!(response.sample_rate, 24_000);
    }

    #[tokio::test]
    async fn mock_err_returns_error() {
        let mock = MockHandshake::err(HandshakeError::Status(503));
        let err = mock.negotiate("agent-1").await.unwrap_err();
        assert!(matches!(err, HandshakeError::Status(503)));
    }
}
