//! Job composition: split one message and its recipients into send jobs.
//!
//! Each job carries a batch payload of the form
//!
//! ```json
//! { "base": { ...message... },
//!   "requests": [ { "to": [{"email": "...", "name": "..."}], "template_variables": {...} } ] }
//! ```
//!
//! with one request per recipient. Idempotency keys are derived from the
//! message, the batch index and the batch's addresses, so running the same
//! request twice produces the same keys and the service can drop the repeats.

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::dispatch::SendJob;
use crate::Recipient;

/// Recipients per job unless overridden.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Largest batch the service accepts.
pub const MAX_BATCH_SIZE: usize = 500;

/// Job composition errors
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    /// Nothing to send
    #[error("recipient list is empty")]
    NoRecipients,

    /// A recipient without an address
    #[error("recipient #{0} has an empty email address")]
    EmptyEmail(usize),

    /// Batch size outside `1..=MAX_BATCH_SIZE`
    #[error("batch size {0} must be between 1 and {MAX_BATCH_SIZE}")]
    InvalidBatchSize(usize),

    /// The base message must be a JSON object
    #[error("base message must be a JSON object")]
    BaseNotObject,
}

/// A message, its recipients and how to split them.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    base: Value,
    recipients: Vec<Recipient>,
    batch_size: usize,
}

impl BatchPlan {
    /// Validate inputs and build a plan.
    pub fn new(
        base: Value,
        recipients: Vec<Recipient>,
        batch_size: usize,
    ) -> Result<Self, ComposeError> {
        if !base.is_object() {
            return Err(ComposeError::BaseNotObject);
        }
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(ComposeError::InvalidBatchSize(batch_size));
        }
        if recipients.is_empty() {
            return Err(ComposeError::NoRecipients);
        }
        if let Some(index) = recipients.iter().position(|r| r.email.trim().is_empty()) {
            return Err(ComposeError::EmptyEmail(index));
        }
        Ok(Self {
            base,
            recipients,
            batch_size,
        })
    }

    /// Number of jobs [`jobs`](Self::jobs) will produce.
    pub fn batch_count(&self) -> usize {
        self.recipients.len().div_ceil(self.batch_size)
    }

    /// Total recipients.
    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    /// Build one job per chunk of at most `batch_size` recipients.
    pub fn jobs(&self) -> Vec<SendJob> {
        self.recipients
            .chunks(self.batch_size)
            .enumerate()
            .map(|(batch_index, chunk)| {
                let payload = json!({
                    "base": self.base,
                    "requests": chunk.iter().map(request_for).collect::<Vec<_>>(),
                });
                let key = idempotency_key(&self.base, batch_index, chunk);
                SendJob::new(payload, key, batch_index, chunk.to_vec())
            })
            .collect()
    }
}

fn request_for(recipient: &Recipient) -> Value {
    let mut to = Map::new();
    to.insert("email".to_string(), Value::String(recipient.email.clone()));
    if let Some(name) = &recipient.name {
        to.insert("name".to_string(), Value::String(name.clone()));
    }

    let mut request = Map::new();
    request.insert("to".to_string(), Value::Array(vec![Value::Object(to)]));
    if let Some(variables) = &recipient.variables {
        let variables: Map<String, Value> = variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        request.insert("template_variables".to_string(), Value::Object(variables));
    }
    Value::Object(request)
}

/// Hex SHA-256 over the message, batch index and recipient addresses.
pub fn idempotency_key(base: &Value, batch_index: usize, recipients: &[Recipient]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base.to_string().as_bytes());
    hasher.update((batch_index as u64).to_le_bytes());
    for recipient in recipients {
        hasher.update(recipient.email.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}
