//! HTTP implementation of [`MessageSender`] for the batch sending API.
//!
//! One request per call. The retry policy belongs to the dispatcher; this
//! client only maps the outcome onto [`SendError`] variants the classifier
//! understands.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{MessageSender, SendError, SendResponse};

/// Production sending endpoint
pub const DEFAULT_API_URL: &str = "https://send.api.mailtrap.io";

/// Sandbox (testing inbox) endpoint
pub const DEFAULT_SANDBOX_URL: &str = "https://sandbox.api.mailtrap.io";

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the caller-assigned idempotency key
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Where requests are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Live sending
    Production {
        /// Base URL of the sending API
        base_url: String,
    },
    /// Sandbox inbox, messages are captured rather than delivered
    Sandbox {
        /// Base URL of the sandbox API
        base_url: String,
        /// Target inbox
        inbox_id: u64,
    },
}

impl Endpoint {
    /// Full URL of the batch endpoint.
    pub fn batch_url(&self) -> String {
        match self {
            Endpoint::Production { base_url } => {
                format!("{}/api/batch", base_url.trim_end_matches('/'))
            }
            Endpoint::Sandbox { base_url, inbox_id } => {
                format!("{}/api/batch/{inbox_id}", base_url.trim_end_matches('/'))
            }
        }
    }
}

/// Batch sender over HTTPS.
pub struct HttpSender {
    client: Arc<Client>,
    endpoint: Endpoint,
    api_token: String,
}

impl HttpSender {
    /// Create a sender sharing an existing client.
    pub fn new(client: Arc<Client>, endpoint: Endpoint, api_token: impl Into<String>) -> Self {
        Self {
            client,
            endpoint,
            api_token: api_token.into(),
        }
    }

    /// Create a sender with its own client using [`REQUEST_TIMEOUT`].
    pub fn with_default_client(
        endpoint: Endpoint,
        api_token: impl Into<String>,
    ) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SendError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::new(Arc::new(client), endpoint, api_token))
    }

    /// Endpoint requests are sent to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn headers(&self, idempotency_key: &str) -> Result<HeaderMap, SendError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_token))
            .map_err(|_| SendError::Other("API token contains invalid characters".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        let key = HeaderValue::from_str(idempotency_key).map_err(|_| {
            SendError::Other("idempotency key contains invalid characters".to_string())
        })?;
        headers.insert(IDEMPOTENCY_HEADER, key);
        Ok(headers)
    }
}

/// Map a transport-level reqwest failure onto a [`SendError`].
pub fn map_transport_error(err: &reqwest::Error) -> SendError {
    if err.is_timeout() {
        SendError::Timeout(err.to_string())
    } else if err.is_connect() {
        SendError::Connection(err.to_string())
    } else if err.is_decode() {
        SendError::InvalidResponse(err.to_string())
    } else {
        SendError::Other(format!("network error: {err}"))
    }
}

#[async_trait::async_trait]
impl MessageSender for HttpSender {
    async fn send(
        &self,
        payload: &serde_json::Value,
        idempotency_key: &str,
    ) -> Result<SendResponse, SendError> {
        let url = self.endpoint.batch_url();
        debug!(url = %url, idempotency_key = %idempotency_key, "Posting batch");

        let response = self
            .client
            .post(&url)
            .headers(self.headers(idempotency_key)?)
            .json(payload)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                body
            };
            return Err(SendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<SendResponse>()
            .await
            .map_err(|e| SendError::InvalidResponse(e.to_string()))
    }
}
