//! reqwest-backed webhook transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use domain::services::{TransportError, TransportResponse, WebhookRequest, WebhookTransport};

/// Response bytes kept for the audit excerpt.
const MAX_RESPONSE_EXCERPT: usize = 4096;

/// User agent sent with every delivery.
pub fn user_agent() -> String {
    format!("crm-webhooks/{}", env!("CARGO_PKG_VERSION"))
}

/// Sends deliveries over HTTPS with a per-attempt timeout.
#[derive(Clone)]
pub struct HttpWebhookTransport {
    client: Client,
}

impl HttpWebhookTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(user_agent())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

/// Reads at most `MAX_RESPONSE_EXCERPT` bytes of the body, then drops the rest.
async fn read_excerpt(mut response: reqwest::Response) -> Result<Vec<u8>, reqwest::Error> {
    let mut excerpt = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = MAX_RESPONSE_EXCERPT - excerpt.len();
        excerpt.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        if excerpt.len() == MAX_RESPONSE_EXCERPT {
            break;
        }
    }
    Ok(excerpt)
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn send(&self, request: WebhookRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.body(request.body).send().await.map_err(classify)?;
        let status = response.status().as_u16();

        // The status decides the outcome; an unreadable body only loses the excerpt.
        let body = match read_excerpt(response).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!(status = status, error = %e, "Failed to read webhook response body");
                String::new()
            }
        };

        Ok(TransportResponse { status, body })
    }
}
