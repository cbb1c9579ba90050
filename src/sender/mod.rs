//! The external sending capability consumed by the dispatch engine.
//!
//! The engine only knows about [`MessageSender`]: hand it a payload and an
//! idempotency key, get back a [`SendResponse`] or a [`SendError`]. Transport
//! details live in the implementations ([`http::HttpSender`] for the real
//! service, scripted mocks in tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod http;

pub use http::{Endpoint, HttpSender};

/// Failures reported by a [`MessageSender`].
///
/// Variants carry as much structure as the transport can provide so the
/// classifier does not have to guess from message text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The service answered with a non-success HTTP status
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The request timed out
    #[error("request timeout: {0}")]
    Timeout(String),

    /// The connection could not be established or was dropped
    #[error("connection error: {0}")]
    Connection(String),

    /// The operation was cancelled before it completed
    #[error("context canceled")]
    Cancelled,

    /// The service answered but the body could not be decoded
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Unstructured failure, classified from its text
    #[error("{0}")]
    Other(String),
}

/// Per-request outcome inside a batch response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientStatus {
    /// Whether this request was accepted
    pub success: bool,
    /// Message identifiers assigned by the service
    #[serde(default)]
    pub message_ids: Vec<String>,
    /// Errors reported for this request
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Successful answer from the sending capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    /// Whether the batch call as a whole was accepted
    pub success: bool,
    /// One status per request in the batch, in request order
    #[serde(default)]
    pub responses: Vec<RecipientStatus>,
}

impl SendResponse {
    /// Build a response where every one of `count` requests was accepted.
    pub fn all_accepted(count: usize) -> Self {
        Self {
            success: true,
            responses: (0..count)
                .map(|i| RecipientStatus {
                    success: true,
                    message_ids: vec![format!("msg-{i}")],
                    errors: Vec::new(),
                })
                .collect(),
        }
    }

    /// Number of recipients the service reported as accepted.
    pub fn successful_recipients(&self) -> usize {
        self.responses.iter().filter(|r| r.success).count()
    }
}

/// A message-sending operation, safe to call from many workers at once.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send one batch payload under the given idempotency key.
    async fn send(
        &self,
        payload: &serde_json::Value,
        idempotency_key: &str,
    ) -> Result<SendResponse, SendError>;
}
