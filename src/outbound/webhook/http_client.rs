use reqwest::{Client, Response, StatusCode};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::schemas::SignedMessage;

/// Default cap on stored response bodies
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024;

/// Error type for HTTP client operations
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response error: status={status}, body={body}")]
    ResponseError { status: StatusCode, body: String },
}

impl HttpClientError {
    /// HTTP status code of the receiver's response, if one arrived
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ResponseError { status, .. } => Some(status.as_u16()),
            _ => None,
        }
    }

    /// Response body captured from a non-2xx reply
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::ResponseError { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Successful (2xx) delivery response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    pub status_code: u16,
    pub response_time_ms: u64,
    pub body: String,
}

/// HTTP client wrapper for webhook delivery
#[derive(Debug, Clone)]
pub struct WebhookHttpClient {
    client: Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl WebhookHttpClient {
    /// Create a new HTTP client with default timeout (10 seconds)
    pub fn new() -> Result<Self, HttpClientError> {
        Self::with_timeout(Duration::from_secs(10))
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("TenantWebhooks/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpClientError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Override the response body cap
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// POST a signed message to `url`
    pub async fn send_webhook(
        &self,
        url: &str,
        message: &SignedMessage,
    ) -> Result<DeliveryResponse, HttpClientError> {
        debug!(url = %url, message_id = %message.message_id, "Sending webhook");

        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("webhook-id", &message.message_id)
            .header("webhook-timestamp", &message.timestamp_header)
            .header("webhook-signature", &message.signature)
            .body(message.body.clone())
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Webhook request failed");
                self.classify(e)
            })?;

        let response_time_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        debug!(
            url = %url,
            status = %status.as_u16(),
            response_time_ms = %response_time_ms,
            "Webhook response received"
        );

        // The status line decides the outcome; a broken body only loses the body
        let body = match self.read_response_body(response).await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    url = %url,
                    status = %status.as_u16(),
                    error = %e,
                    "Failed to read webhook response body"
                );
                String::new()
            }
        };

        if !status.is_success() {
            return Err(HttpClientError::ResponseError { status, body });
        }

        Ok(DeliveryResponse {
            status_code: status.as_u16(),
            response_time_ms,
            body,
        })
    }

    fn classify(&self, err: reqwest::Error) -> HttpClientError {
        if err.is_timeout() {
            HttpClientError::Timeout(self.timeout)
        } else if err.is_connect() {
            HttpClientError::NetworkError(err.to_string())
        } else {
            HttpClientError::RequestFailed(err.to_string())
        }
    }

    /// Read at most `max_body_bytes` of the response body
    async fn read_response_body(&self, mut response: Response) -> Result<String, HttpClientError> {
        let mut bytes: Vec<u8> = Vec::new();

        while bytes.len() < self.max_body_bytes {
            match response.chunk().await {
                Ok(Some(chunk)) => bytes.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) if e.is_timeout() => return Err(HttpClientError::Timeout(self.timeout)),
                Err(e) => {
                    return Err(HttpClientError::RequestFailed(format!(
                        "Failed to read response body: {e}"
                    )));
                }
            }
        }

        if bytes.len() > self.max_body_bytes {
            debug!(
                max_size = self.max_body_bytes,
                "Response body too large, truncating"
            );
            bytes.truncate(self.max_body_bytes);
        }

        Ok(truncate_utf8(&bytes))
    }

    /// Get configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Lossy decode that drops a multi-byte character split by truncation
fn truncate_utf8(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(e) if e.error_len().is_none() => {
            String::from_utf8_lossy(&bytes[..e.valid_up_to()]).into_owned()
        }
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}
