//! Aggregation of per-job results into a [`BatchResult`]

use std::path::PathBuf;
use tracing::debug;

use super::classify::error_code;
use super::failures::{FailedRecipient, FailurePersister};
use super::job::SendResult;
use super::progress::ProgressStats;
use crate::sender::{SendError, SendResponse};

/// Outcome of a whole dispatch run.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Jobs submitted
    pub total_jobs: usize,
    /// Recipients across all submitted jobs
    pub total_recipients: usize,
    /// Jobs accepted by the service
    pub successful_jobs: usize,
    /// Jobs that failed, including those cancelled before starting
    pub failed_jobs: usize,
    /// Recipients the service reported as accepted
    pub successful_recipients: usize,
    /// One record per recipient of every failed job
    pub failed_recipients: Vec<FailedRecipient>,
    /// Raw responses of successful jobs
    pub responses: Vec<SendResponse>,
    /// Final errors of failed jobs
    pub errors: Vec<SendError>,
    /// Progress statistics at the end of the run
    pub stats: ProgressStats,
    /// Where failed recipients were saved, if anywhere
    pub failure_file: Option<PathBuf>,
    /// Whether the run was cut short by cancellation
    pub cancelled: bool,
}

impl BatchResult {
    /// Exit classification of this result.
    pub fn exit_status(&self) -> ExitStatus {
        ExitStatus::from_result(self)
    }
}

/// Process exit classification. The four cases are exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Every job succeeded
    Success,
    /// Nothing was dispatched at all
    CriticalError,
    /// Some jobs succeeded, some failed
    PartialSuccess,
    /// Every job failed
    AllFailed,
}

impl ExitStatus {
    /// Classify a batch result.
    pub fn from_result(result: &BatchResult) -> Self {
        if result.total_jobs == 0 {
            Self::CriticalError
        } else if result.failed_jobs == result.total_jobs {
            Self::AllFailed
        } else if result.successful_jobs == result.total_jobs {
            Self::Success
        } else {
            Self::PartialSuccess
        }
    }

    /// Process exit code.
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::CriticalError => 1,
            Self::PartialSuccess => 2,
            Self::AllFailed => 3,
        }
    }
}

/// Folds [`SendResult`]s into a [`BatchResult`].
#[derive(Debug, Default)]
pub struct ResultAggregator {
    result: BatchResult,
}

impl ResultAggregator {
    /// Start aggregating a run of `total_jobs` jobs and `total_recipients` recipients.
    pub fn new(total_jobs: usize, total_recipients: usize) -> Self {
        Self {
            result: BatchResult {
                total_jobs,
                total_recipients,
                ..Default::default()
            },
        }
    }

    /// Fold one job outcome.
    pub fn record(&mut self, outcome: SendResult) {
        if outcome.success {
            self.result.successful_jobs += 1;
            self.result.successful_recipients += outcome.successful_recipients();
            if let Some(response) = outcome.response {
                self.result.responses.push(response);
            }
            return;
        }

        self.result.failed_jobs += 1;
        let error = outcome
            .error
            .unwrap_or_else(|| SendError::Other("unknown error".to_string()));
        if error == SendError::Cancelled {
            self.result.cancelled = true;
        }

        let message = error.to_string();
        let code = error_code(Some(&error));
        self.result.failed_recipients.extend(
            outcome
                .job
                .recipients
                .iter()
                .map(|r| FailedRecipient::new(r, message.clone(), code, outcome.retryable)),
        );
        debug!(
            batch_index = outcome.job.batch_index,
            recipients = outcome.job.recipient_count,
            error = %message,
            "Recorded failed job"
        );
        self.result.errors.push(error);
    }

    /// Mark the run as cancelled even if no job observed it.
    pub fn mark_cancelled(&mut self) {
        self.result.cancelled = true;
    }

    /// Attach final statistics, persist failures if any, and return the result.
    pub fn finish(
        mut self,
        stats: ProgressStats,
        persister: Option<&FailurePersister>,
    ) -> BatchResult {
        self.result.stats = stats;
        if !self.result.failed_recipients.is_empty() {
            if let Some(persister) = persister {
                self.result.failure_file = persister.persist(&self.result.failed_recipients);
            }
        }
        self.result
    }
}
