//! Outbound HTTP transport abstraction for webhook deliveries.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// A signed POST ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    /// Exact bytes covered by the signature.
    pub body: Vec<u8>,
}

impl WebhookRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response received from a receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }

    /// Only 2xx counts as delivered.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures where no response was received.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request failed: {0}")]
    Other(String),
}

/// Sends webhook requests. Implementations bound each call with a timeout.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: WebhookRequest) -> Result<TransportResponse, TransportError>;
}

/// Transport for tests: replays scripted results and records every request.
///
/// Once the script is empty every request gets the fallback result.
#[derive(Debug)]
pub struct MockWebhookTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    fallback: Result<TransportResponse, TransportError>,
    requests: Mutex<Vec<WebhookRequest>>,
}

impl Default for MockWebhookTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWebhookTransport {
    /// Answers every request with 200 OK.
    pub fn new() -> Self {
        Self::with_fallback(Ok(TransportResponse::new(200)))
    }

    /// Answers every request with the given status.
    pub fn responding(status: u16) -> Self {
        Self::with_fallback(Ok(TransportResponse::new(status)))
    }

    /// Fails every request without a response.
    pub fn failing(error: TransportError) -> Self {
        Self::with_fallback(Err(error))
    }

    fn with_fallback(fallback: Result<TransportResponse, TransportError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues results returned before the fallback applies.
    pub fn push(&self, result: Result<TransportResponse, TransportError>) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(result);
    }

    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl WebhookTransport for MockWebhookTransport {
    async fn send(&self, request: WebhookRequest) -> Result<TransportResponse, TransportError> {
        tracing::debug!(url = %request.url, "Mock: Would POST webhook");
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> WebhookRequest {
        WebhookRequest {
            url: "https://example.com/hook".to_string(),
            headers: vec![("X-Webhook-Event", "invoice.paid".to_string())],
            body: b"{}".to_vec(),
        }
    }

    #[test]
    fn test_response_is_success() {
        assert!(TransportResponse::new(200).is_success());
        assert!(TransportResponse::new(204).is_success());
        assert!(!TransportResponse::new(199).is_success());
        assert!(!TransportResponse::new(301).is_success());
        assert!(!TransportResponse::new(404).is_success());
        assert!(!TransportResponse::new(500).is_success());
    }

    #[test]
    fn test_request_header_lookup_is_case_insensitive() {
        assert_eq!(request().header("x-webhook-event"), Some("invoice.paid"));
        assert_eq!(request().header("X-Missing"), None);
    }

    #[tokio::test]
    async fn test_mock_replays_script_then_fallback() {
        let transport = MockWebhookTransport::new();
        transport.push(Ok(TransportResponse::new(500)));
        transport.push(Err(TransportError::Timeout));

        assert_eq!(transport.send(request()).await.unwrap().status, 500);
        assert_eq!(transport.send(request()).await, Err(TransportError::Timeout));
        assert_eq!(transport.send(request()).await.unwrap().status, 200);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let transport =
            MockWebhookTransport::failing(TransportError::Connection("refused".to_string()));
        let err = transport.send(request()).await.unwrap_err();
        assert_eq!(err.to_string(), "Connection failed: refused");
        assert_eq!(transport.requests()[0].url, "https://example.com/hook");
    }
}
