//! Batch dispatch engine
//!
//! Takes a list of independent [`SendJob`]s and runs them against a
//! [`MessageSender`](crate::sender::MessageSender) under a bounded
//! concurrency limit, retrying transient failures, reporting live progress
//! and capturing failed recipients for a later retry.
//!
//! # Overview
//!
//! 1. **Jobs**: built by the caller (see [`crate::compose`]) as [`SendJob`]s
//! 2. **Dispatch**: [`BatchDispatcher::process_jobs`] feeds them to `C` workers
//! 3. **Retry**: transient failures ([`classify`]) are retried with linear backoff
//! 4. **Progress**: [`ProgressReporter`] counts completions from every worker
//! 5. **Aggregation**: results fold into a [`BatchResult`]; failed recipients are
//!    written by the [`FailurePersister`]
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mailcast::dispatch::{BatchDispatcher, SendJob};
//! use mailcast::sender::{Endpoint, HttpSender};
//! use mailcast::Recipient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sender = HttpSender::with_default_client(
//!     Endpoint::Production { base_url: "https://send.api.mailtrap.io".into() },
//!     "token",
//! )?;
//! let job = SendJob::new(
//!     serde_json::json!({"base": {"subject": "Hi"}, "requests": []}),
//!     "batch-0",
//!     0,
//!     vec![Recipient::new("ada@example.com")],
//! );
//!
//! let dispatcher = BatchDispatcher::new(Arc::new(sender));
//! let result = dispatcher.process_jobs(vec![job], 4, 3).await?;
//! println!("exit code {}", result.exit_status().code());
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Job failures never surface as `Err`: they are counted in [`BatchResult`].
//! [`DispatchError`] is returned only when a run cannot start.

pub mod classify;
pub mod config;
pub mod executor;
pub mod failures;
pub mod job;
pub mod progress;
pub mod result;

pub use classify::ErrorKind;
pub use config::DispatchConfig;
pub use executor::BatchDispatcher;
pub use failures::{FailedRecipient, FailureFileError, FailurePersister};
pub use job::{SendJob, SendResult};
pub use progress::{ProgressMode, ProgressReporter, ProgressStats};
pub use result::{BatchResult, ExitStatus, ResultAggregator};

/// Errors that prevent a dispatch run from starting
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Concurrency must be at least one worker
    #[error("invalid concurrency {0}: at least one worker is required")]
    InvalidConcurrency(usize),

    /// Called outside a Tokio runtime, so no workers can be spawned
    #[error("no async runtime available to spawn workers")]
    NoRuntime,
}
