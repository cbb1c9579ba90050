//! Batch dispatcher: bounded worker pool with per-job retry
//!
//! A feeder task pushes jobs into a bounded channel of capacity
//! `min(C, jobs)`; as many workers pull from it, run each job through the
//! retry policy and push one [`SendResult`] per job into a result channel sized to the job count. The
//! result channel closes once every worker has exited, which ends the
//! collection loop.
//!
//! On cancellation the feeder stops, workers stop taking jobs and in-flight
//! sends or backoffs end with [`SendError::Cancelled`]. Jobs that never
//! reached a worker are recorded as cancelled failures, so every submitted job
//! still yields exactly one result.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::classify::ErrorKind;
use super::config::{calculate_backoff, DispatchConfig, BACKOFF_UNIT};
use super::failures::FailurePersister;
use super::job::{SendJob, SendResult};
use super::progress::ProgressReporter;
use super::result::{BatchResult, ResultAggregator};
use super::DispatchError;
use crate::metrics;
use crate::sender::{MessageSender, SendError};
use crate::shutdown::{SharedShutdown, ShutdownCoordinator};

type JobQueue = Arc<Mutex<mpsc::Receiver<SendJob>>>;

/// Runs batches of [`SendJob`]s against a [`MessageSender`].
pub struct BatchDispatcher {
    sender: Arc<dyn MessageSender>,
    progress: Arc<ProgressReporter>,
    shutdown: SharedShutdown,
    persister: Option<FailurePersister>,
    backoff_unit: Duration,
}

impl BatchDispatcher {
    /// Dispatcher with silent progress, no failure file and its own shutdown signal.
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self {
            sender,
            progress: Arc::new(ProgressReporter::disabled()),
            shutdown: ShutdownCoordinator::shared(),
            persister: None,
            backoff_unit: BACKOFF_UNIT,
        }
    }

    /// Report progress through `progress`.
    pub fn with_progress(mut self, progress: Arc<ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Attach a shared shutdown handle for cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Save failed recipients through `persister` after each run.
    pub fn with_failure_persister(mut self, persister: FailurePersister) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Override the linear backoff step.
    pub fn with_backoff_unit(mut self, backoff_unit: Duration) -> Self {
        self.backoff_unit = backoff_unit;
        self
    }

    /// Progress reporter in use.
    pub fn progress(&self) -> &Arc<ProgressReporter> {
        &self.progress
    }

    /// Shutdown handle in use.
    pub fn shutdown(&self) -> &SharedShutdown {
        &self.shutdown
    }

    /// Execute every job once with up to `max_retries` retries each, at most
    /// `concurrency` at a time.
    ///
    /// Job failures are reported inside the [`BatchResult`]; the error is
    /// reserved for runs that cannot start at all.
    pub async fn process_jobs(
        &self,
        jobs: Vec<SendJob>,
        concurrency: usize,
        max_retries: u32,
    ) -> Result<BatchResult, DispatchError> {
        if jobs.is_empty() {
            debug!("No jobs to dispatch");
            return Ok(BatchResult::default());
        }
        let config =
            DispatchConfig::new(concurrency, max_retries)?.with_backoff_unit(self.backoff_unit);
        self.run(jobs, config).await
    }

    /// Like [`process_jobs`](Self::process_jobs) with a prepared config.
    pub async fn run(
        &self,
        jobs: Vec<SendJob>,
        config: DispatchConfig,
    ) -> Result<BatchResult, DispatchError> {
        if jobs.is_empty() {
            return Ok(BatchResult::default());
        }
        if config.concurrency == 0 {
            return Err(DispatchError::InvalidConcurrency(0));
        }
        tokio::runtime::Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;

        let total_jobs = jobs.len();
        let total_recipients: usize = jobs.iter().map(|j| j.recipient_count).sum();
        let span = info_span!(
            "dispatch",
            jobs = total_jobs,
            recipients = total_recipients,
            concurrency = config.concurrency,
            max_retries = config.max_retries
        );

        self.run_inner(jobs, config, total_recipients)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        jobs: Vec<SendJob>,
        config: DispatchConfig,
        total_recipients: usize,
    ) -> Result<BatchResult, DispatchError> {
        let total_jobs = jobs.len();
        info!("Dispatching batch");
        self.progress.start(total_recipients as u64);

        // At most one worker per job.
        let worker_count = config.concurrency.min(total_jobs);
        let (job_tx, job_rx) = mpsc::channel::<SendJob>(worker_count);
        let (result_tx, mut result_rx) = mpsc::channel::<SendResult>(total_jobs);
        let queue: JobQueue = Arc::new(Mutex::new(job_rx));

        let feeder = tokio::spawn(
            feed(jobs, job_tx, self.shutdown.clone()).instrument(info_span!("feeder")),
        );

        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let worker = Worker {
                id,
                sender: self.sender.clone(),
                progress: self.progress.clone(),
                shutdown: self.shutdown.clone(),
                config,
            };
            workers.spawn(
                worker
                    .run(queue.clone(), result_tx.clone())
                    .instrument(info_span!("worker", id = id)),
            );
        }
        drop(result_tx);

        let mut aggregator = ResultAggregator::new(total_jobs, total_recipients);
        while let Some(outcome) = result_rx.recv().await {
            aggregator.record(outcome);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
            }
        }

        // Unblock the feeder if it is still waiting for capacity, then collect
        // everything that never reached a worker.
        let mut leftovers = Vec::new();
        {
            let mut rx = queue.lock().await;
            rx.close();
            while let Ok(job) = rx.try_recv() {
                leftovers.push(job);
            }
        }
        match feeder.await {
            Ok(unfed) => leftovers.extend(unfed),
            Err(e) => error!(error = %e, "Feeder task failed"),
        }

        if !leftovers.is_empty() {
            warn!(jobs = leftovers.len(), "Jobs cancelled before dispatch");
        }
        for job in leftovers {
            let outcome = SendResult::cancelled(job);
            report_progress(&self.progress, &outcome);
            aggregator.record(outcome);
        }

        if self.shutdown.is_shutdown_requested() {
            aggregator.mark_cancelled();
        }

        let stats = self.progress.finish();
        let result = aggregator.finish(stats, self.persister.as_ref());

        info!(
            successful_jobs = result.successful_jobs,
            failed_jobs = result.failed_jobs,
            successful_recipients = result.successful_recipients,
            failed_recipients = result.failed_recipients.len(),
            cancelled = result.cancelled,
            "Batch dispatch finished"
        );
        Ok(result)
    }
}

/// Push jobs into the queue; returns the jobs left unsent on cancellation.
async fn feed(
    jobs: Vec<SendJob>,
    queue: mpsc::Sender<SendJob>,
    shutdown: SharedShutdown,
) -> Vec<SendJob> {
    let mut pending = jobs.into_iter();
    while let Some(job) = pending.next() {
        if shutdown.is_shutdown_requested() {
            debug!("Shutdown requested, feeder stopping");
            return std::iter::once(job).chain(pending).collect();
        }
        tokio::select! {
            biased;
            _ = shutdown.wait_for_shutdown() => {
                debug!("Shutdown requested while waiting for queue capacity");
                return std::iter::once(job).chain(pending).collect();
            }
            permit = queue.reserve() => match permit {
                Ok(permit) => permit.send(job),
                Err(_) => {
                    debug!("Job queue closed, feeder stopping");
                    return std::iter::once(job).chain(pending).collect();
                }
            },
        }
    }
    Vec::new()
}

/// Translate one job outcome into progress updates: one per accepted
/// recipient on success, one per job recipient on failure.
fn report_progress(progress: &ProgressReporter, outcome: &SendResult) {
    if outcome.success {
        for _ in 0..outcome.successful_recipients() {
            progress.update(true);
        }
    } else {
        for _ in 0..outcome.job.recipient_count {
            progress.update(false);
        }
    }
}

struct Worker {
    id: usize,
    sender: Arc<dyn MessageSender>,
    progress: Arc<ProgressReporter>,
    shutdown: SharedShutdown,
    config: DispatchConfig,
}

impl Worker {
    async fn run(self, queue: JobQueue, results: mpsc::Sender<SendResult>) {
        debug!(worker = self.id, "Worker started");
        loop {
            if self.shutdown.is_shutdown_requested() {
                debug!(worker = self.id, "Shutdown requested, worker stopping");
                break;
            }

            let next = {
                let mut rx = queue.lock().await;
                tokio::select! {
                    biased;
                    _ = self.shutdown.wait_for_shutdown() => None,
                    job = rx.recv() => job,
                }
            };
            let Some(job) = next else {
                break;
            };

            let outcome = self.execute_with_retry(job).await;
            report_progress(&self.progress, &outcome);
            metrics::record_job(
                outcome.success,
                outcome.attempts,
                outcome.job.recipient_count,
                outcome.duration,
            );

            if results.send(outcome).await.is_err() {
                warn!(worker = self.id, "Result channel closed, worker stopping");
                break;
            }
        }
        debug!(worker = self.id, "Worker finished");
    }

    /// Up to `max_retries + 1` sequential attempts with linear backoff.
    async fn execute_with_retry(&self, job: SendJob) -> SendResult {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts();
        let mut attempt = 0;

        loop {
            if self.shutdown.is_shutdown_requested() {
                return SendResult::failed(
                    job,
                    SendError::Cancelled,
                    false,
                    attempt,
                    started.elapsed(),
                );
            }
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.wait_for_shutdown() => Err(SendError::Cancelled),
                sent = self.sender.send(&job.payload, &job.idempotency_key) => sent,
            };

            let error = match outcome {
                Ok(response) => {
                    if attempt > 1 {
                        info!(
                            batch_index = job.batch_index,
                            "Retry attempt {}/{} succeeded", attempt, max_attempts
                        );
                    }
                    return SendResult::succeeded(job, response, attempt, started.elapsed());
                }
                Err(error) => error,
            };

            let kind = ErrorKind::from_send_error(&error);
            let retryable = kind.is_retryable();
            if !retryable || attempt >= max_attempts {
                warn!(
                    batch_index = job.batch_index,
                    attempts = attempt,
                    retryable = retryable,
                    error = %error,
                    "Job failed"
                );
                return SendResult::failed(job, error, retryable, attempt, started.elapsed());
            }

            let backoff = calculate_backoff(attempt, self.config.backoff_unit);
            warn!(
                batch_index = job.batch_index,
                error = %error,
                "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds",
                attempt + 1,
                max_attempts,
                kind.description(),
                backoff.as_secs_f64()
            );
            metrics::record_retry(attempt, backoff);

            tokio::select! {
                biased;
                _ = self.shutdown.wait_for_shutdown() => {
                    return SendResult::failed(
                        job,
                        SendError::Cancelled,
                        false,
                        attempt,
                        started.elapsed(),
                    );
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }
}
