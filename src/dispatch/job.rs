//! Send jobs and their per-job outcomes

use crate::sender::{SendError, SendResponse};
use crate::Recipient;
use std::time::Duration;

/// One unit of work: a batch payload addressed to a fixed set of recipients.
///
/// Built before dispatch and moved into the job queue; exactly one worker
/// consumes it.
#[derive(Debug, Clone, PartialEq)]
pub struct SendJob {
    /// Opaque request body handed to the sender
    pub payload: serde_json::Value,
    /// Caller-assigned key, unique per job, so the service can drop duplicates
    pub idempotency_key: String,
    /// Position of this job among those derived from one request
    pub batch_index: usize,
    /// Recipients addressed by the payload, in payload order
    pub recipients: Vec<Recipient>,
    /// `recipients.len()`, kept for progress weighting
    pub recipient_count: usize,
}

impl SendJob {
    /// Create a job; `recipient_count` is derived from `recipients`.
    pub fn new(
        payload: serde_json::Value,
        idempotency_key: impl Into<String>,
        batch_index: usize,
        recipients: Vec<Recipient>,
    ) -> Self {
        let recipient_count = recipients.len();
        Self {
            payload,
            idempotency_key: idempotency_key.into(),
            batch_index,
            recipients,
            recipient_count,
        }
    }
}

/// Final outcome of one job after retries.
#[derive(Debug, Clone)]
pub struct SendResult {
    /// The job this result belongs to
    pub job: SendJob,
    /// Response of the successful attempt
    pub response: Option<SendResponse>,
    /// Error of the last failed attempt
    pub error: Option<SendError>,
    /// Whether the job was accepted
    pub success: bool,
    /// Classification of `error`; meaningless when `success` is true
    pub retryable: bool,
    /// Number of calls made to the sender
    pub attempts: u32,
    /// First attempt to final outcome, backoff included
    pub duration: Duration,
}

impl SendResult {
    /// Successful outcome.
    pub fn succeeded(
        job: SendJob,
        response: SendResponse,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            job,
            response: Some(response),
            error: None,
            success: true,
            retryable: false,
            attempts,
            duration,
        }
    }

    /// Failed outcome carrying the last error.
    pub fn failed(
        job: SendJob,
        error: SendError,
        retryable: bool,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            job,
            response: None,
            error: Some(error),
            success: false,
            retryable,
            attempts,
            duration,
        }
    }

    /// A job that never reached a worker because the run was cancelled.
    pub fn cancelled(job: SendJob) -> Self {
        Self::failed(job, SendError::Cancelled, false, 0, Duration::ZERO)
    }

    /// Recipients the service reported as accepted (0 on failure).
    pub fn successful_recipients(&self) -> usize {
        self.response
            .as_ref()
            .map(SendResponse::successful_recipients)
            .unwrap_or(0)
    }
}
