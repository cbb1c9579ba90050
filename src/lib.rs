//! # Mailcast
//!
//! Batch dispatch engine for a transactional-email command line client.
//!
//! A message and a recipient list are split into batch send jobs, which are
//! executed concurrently against the sending API with retry, live progress
//! and a failure file that can be fed back into a later run.
//!
//! ## Architecture
//!
//! - [`compose`] - Split a message and its recipients into [`dispatch::SendJob`]s
//! - [`dispatch`] - Worker pool, retry, progress, aggregation and failure persistence
//! - [`sender`] - The [`sender::MessageSender`] seam and its HTTP implementation
//! - [`shutdown`] - Cooperative cancellation shared by every worker
//! - [`metrics`] - Prometheus counters for dispatch runs
//! - [`cli`] - The `mailcast` command line

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod cli;
pub mod compose;
pub mod dispatch;
pub mod metrics;
pub mod sender;
pub mod shutdown;

pub use compose::{BatchPlan, ComposeError};
pub use dispatch::{BatchDispatcher, BatchResult, DispatchError, ExitStatus, SendJob, SendResult};
pub use sender::{MessageSender, SendError, SendResponse};

/// One addressee of a batch send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    /// Email address
    pub email: String,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Per-recipient template variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<BTreeMap<String, serde_json::Value>>,
}

impl Recipient {
    /// Create a recipient with just an address.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
            variables: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a template variable.
    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }
}
