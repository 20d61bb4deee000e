//! Transport adapter (spec §4.3.3, §6): POST a JSON body to the invoke
//! endpoint and return status + body. This is the crate's sole HTTP-shaped
//! external collaborator; everything above it is transport-agnostic.

use crate::error::RandomOrgError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// The RANDOM.ORG JSON-RPC invoke endpoint.
pub const INVOKE_URL: &str = "https://api.random.org/json-rpc/4/invoke";

/// The RANDOM.ORG signature-verification form endpoint.
pub const SIGNATURE_VERIFICATION_URL: &str = "https://api.random.org/verify";

/// Narrow interface the dispatch engine depends on: POST a JSON body,
/// get back an HTTP status and a body (or fail with an I/O/URL error).
/// Retry of arbitrary transport failures is explicitly out of scope; the
/// dispatch engine never retries what this trait returns.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn post_json(&self, url: &str, body: &Value) -> Result<(u16, String), RandomOrgError>;
}

/// Default production transport, backed by a pooled `reqwest::Client`.
///
/// Grounded on the connect/total-timeout client-builder shape used by
/// JSON-RPC-over-HTTP adapters elsewhere in the ecosystem: one client built
/// once and reused, explicit timeouts rather than relying on defaults.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport with the given total per-request timeout.
    pub fn new(http_timeout: Duration) -> Result<Self, RandomOrgError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(http_timeout)
            .build()
            .map_err(|e| RandomOrgError::Io { message: e.to_string() })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<(u16, String), RandomOrgError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    RandomOrgError::Io { message: e.to_string() }
                } else {
                    RandomOrgError::MalformedUrl { message: e.to_string() }
                }
            })?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RandomOrgError::Io { message: e.to_string() })?;
        Ok((status, text))
    }
}

/// Scripted response queued for a [`FakeTransport`] call.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Success { status: u16, body: Value },
    HttpError { status: u16, body: String },
    Failure(String),
    /// Block for `delay` before resolving with `status`/`body` — used to
    /// exercise SendTimeout under a short blocking budget.
    Delayed { delay: Duration, status: u16, body: Value },
}

/// In-memory [`Transport`] double that records every request it receives
/// and replies from a pre-scripted queue: a `TrackingSleeper`-style call
/// recorder crossed with a stub HTTP server.
#[derive(Debug, Default)]
pub struct FakeTransport {
    script: Mutex<std::collections::VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<Value>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: ScriptedResponse) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post_json(&self, _url: &str, body: &Value) -> Result<(u16, String), RandomOrgError> {
        self.requests.lock().unwrap().push(body.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(ScriptedResponse::Success { status, body }) => Ok((status, body.to_string())),
            Some(ScriptedResponse::HttpError { status, body }) => Ok((status, body)),
            Some(ScriptedResponse::Failure(message)) => Err(RandomOrgError::Io { message }),
            Some(ScriptedResponse::Delayed { delay, status, body }) => {
                tokio::time::sleep(delay).await;
                Ok((status, body.to_string()))
            }
            None => Err(RandomOrgError::Io { message: "FakeTransport: script exhausted".into() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fake_transport_replays_scripted_responses_in_order() {
        let transport = FakeTransport::new();
        transport.push(ScriptedResponse::Success { status: 200, body: json!({"a": 1}) });
        transport.push(ScriptedResponse::Success { status: 200, body: json!({"a": 2}) });

        let (status, body) = transport.post_json("http://x", &json!({})).await.unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, json!({"a": 1}).to_string());

        let (_, body) = transport.post_json("http://x", &json!({})).await.unwrap();
        assert_eq!(body, json!({"a": 2}).to_string());

        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn fake_transport_records_request_bodies() {
        let transport = FakeTransport::new();
        transport.push(ScriptedResponse::Success { status: 200, body: json!({}) });
        let sent = json!({"method": "generateIntegers"});
        let _ = transport.post_json("http://x", &sent).await.unwrap();
        assert_eq!(transport.requests(), vec![sent]);
    }
}
