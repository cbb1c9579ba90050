//! End-to-end behavior of the batch dispatcher against a scripted sender

use std::sync::Arc;
use std::time::Duration;

use mailcast::dispatch::failures::load_failures;
use mailcast::dispatch::{
    BatchDispatcher, DispatchError, ExitStatus, FailurePersister, ProgressMode, ProgressReporter,
};
use mailcast::sender::SendError;
use mailcast::shutdown::ShutdownCoordinator;
use tempfile::TempDir;

use super::mock_sender::{api_error, jobs, Outcome, ScriptedSender};

const FAST_BACKOFF: Duration = Duration::from_millis(1);

#[tokio::test]
async fn test_terminal_failure_lands_in_failure_file() {
    let dir = TempDir::new().unwrap();
    let sender = Arc::new(ScriptedSender::accepting().script(
        "key-2",
        vec![Outcome::Fail(api_error(400, "invalid sender address"))],
    ));
    let dispatcher = BatchDispatcher::new(sender.clone())
        .with_failure_persister(FailurePersister::new(dir.path()))
        .with_backoff_unit(FAST_BACKOFF);

    let result = dispatcher.process_jobs(jobs(3, 2), 2, 3).await.unwrap();

    assert_eq!(result.total_jobs, 3);
    assert_eq!(result.successful_jobs, 2);
    assert_eq!(result.failed_jobs, 1);
    assert_eq!(result.successful_recipients, 4);
    assert_eq!(result.responses.len(), 2);
    assert_eq!(result.exit_status(), ExitStatus::PartialSuccess);
    assert_eq!(result.exit_status().code(), 2);
    assert!(!result.cancelled);

    // Client errors are not retried.
    assert_eq!(sender.calls_for("key-2"), 1);

    let path = result.failure_file.expect("failure file written");
    assert!(path.starts_with(dir.path()));
    let failures = load_failures(&path).unwrap();
    let mut emails: Vec<&str> = failures.iter().map(|f| f.email.as_str()).collect();
    emails.sort_unstable();
    assert_eq!(emails, vec!["user2-0@example.com", "user2-1@example.com"]);
    assert!(failures.iter().all(|f| f.error_code == 400 && !f.retryable));
    assert!(failures[0].error.contains("invalid sender address"));
}

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let sender = Arc::new(ScriptedSender::accepting().script(
        "key-0",
        vec![
            Outcome::Fail(api_error(503, "Service Unavailable")),
            Outcome::Fail(SendError::Timeout("deadline exceeded".to_string())),
        ],
    ));
    let dispatcher = BatchDispatcher::new(sender.clone()).with_backoff_unit(FAST_BACKOFF);

    let result = dispatcher.process_jobs(jobs(1, 5), 1, 3).await.unwrap();

    assert_eq!(sender.calls_for("key-0"), 3);
    assert_eq!(result.successful_jobs, 1);
    assert_eq!(result.successful_recipients, 5);
    assert!(result.failure_file.is_none());
    assert_eq!(result.exit_status(), ExitStatus::Success);
}

#[tokio::test]
async fn test_retryable_failure_exhausts_attempts() {
    let dir = TempDir::new().unwrap();
    let sender = Arc::new(ScriptedSender::new(Outcome::Fail(api_error(
        500,
        "Internal Server Error",
    ))));
    let dispatcher = BatchDispatcher::new(sender.clone())
        .with_failure_persister(FailurePersister::new(dir.path()))
        .with_backoff_unit(FAST_BACKOFF);

    let result = dispatcher.process_jobs(jobs(2, 1), 2, 2).await.unwrap();

    assert_eq!(sender.calls_for("key-0"), 3);
    assert_eq!(sender.calls_for("key-1"), 3);
    assert_eq!(result.failed_jobs, 2);
    assert_eq!(result.exit_status(), ExitStatus::AllFailed);
    assert_eq!(result.exit_status().code(), 3);
    assert!(result.failed_recipients.iter().all(|f| f.retryable));
    assert!(result.failed_recipients.iter().all(|f| f.error_code == 500));
    assert!(result.failure_file.is_some());
}

#[tokio::test]
async fn test_zero_retries_means_single_attempt() {
    let sender = Arc::new(ScriptedSender::new(Outcome::Fail(SendError::Connection(
        "connection refused".to_string(),
    ))));
    let dispatcher = BatchDispatcher::new(sender.clone()).with_backoff_unit(FAST_BACKOFF);

    let result = dispatcher.process_jobs(jobs(1, 1), 1, 0).await.unwrap();

    assert_eq!(sender.total_calls(), 1);
    assert_eq!(result.failed_jobs, 1);
    assert!(result.failed_recipients[0].retryable);
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let sender = Arc::new(ScriptedSender::accepting().with_delay(Duration::from_millis(20)));
    let dispatcher = BatchDispatcher::new(sender.clone());

    let result = dispatcher.process_jobs(jobs(20, 1), 3, 0).await.unwrap();

    assert_eq!(result.successful_jobs, 20);
    assert_eq!(sender.total_calls(), 20);
    assert!(sender.max_in_flight() <= 3, "saw {}", sender.max_in_flight());
    assert!(sender.max_in_flight() >= 1);
}

#[tokio::test]
async fn test_more_workers_than_jobs() {
    let sender = Arc::new(ScriptedSender::accepting());
    let dispatcher = BatchDispatcher::new(sender.clone());

    let result = dispatcher.process_jobs(jobs(2, 3), 16, 1).await.unwrap();

    assert_eq!(result.successful_jobs, 2);
    assert_eq!(result.successful_recipients, 6);
    assert_eq!(sender.total_calls(), 2);
}

#[tokio::test]
async fn test_cancellation_returns_promptly_with_every_job_accounted() {
    let dir = TempDir::new().unwrap();
    let sender = Arc::new(ScriptedSender::new(Outcome::Hang));
    let shutdown = ShutdownCoordinator::shared();
    let dispatcher = BatchDispatcher::new(sender.clone())
        .with_shutdown(shutdown.clone())
        .with_failure_persister(FailurePersister::new(dir.path()));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown.request_shutdown();
        }
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        dispatcher.process_jobs(jobs(10, 2), 2, 3),
    )
    .await
    .expect("dispatch did not stop after cancellation")
    .unwrap();

    assert!(result.cancelled);
    assert_eq!(result.total_jobs, 10);
    assert_eq!(result.successful_jobs + result.failed_jobs, result.total_jobs);
    assert_eq!(result.failed_jobs, 10);
    assert_eq!(result.failed_recipients.len(), 20);
    assert!(result.errors.iter().all(|e| *e == SendError::Cancelled));
    assert!(sender.total_calls() <= 2);

    // Cancelled recipients are kept for resubmission.
    let failures = load_failures(&result.failure_file.unwrap()).unwrap();
    assert_eq!(failures.len(), 20);
    assert!(failures.iter().all(|f| f.error == "context canceled"));
}

#[tokio::test]
async fn test_cancellation_during_backoff_keeps_completed_jobs() {
    let sender = Arc::new(ScriptedSender::accepting().script(
        "key-2",
        vec![Outcome::Fail(api_error(503, "Service Unavailable"))],
    ));
    let shutdown = ShutdownCoordinator::shared();
    let dispatcher = BatchDispatcher::new(sender.clone())
        .with_shutdown(shutdown.clone())
        .with_backoff_unit(Duration::from_secs(30));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            shutdown.request_shutdown();
        }
    });

    let started = std::time::Instant::now();
    let result = dispatcher.process_jobs(jobs(3, 1), 3, 3).await.unwrap();
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_secs(5),
        "backoff was not interrupted: {elapsed:?}"
    );
    assert!(result.cancelled);
    assert_eq!(result.successful_jobs, 2);
    assert_eq!(result.failed_jobs, 1);
    assert_eq!(result.successful_recipients, 2);
    assert_eq!(sender.calls_for("key-2"), 1);
}

#[tokio::test]
async fn test_concurrency_far_above_job_count() {
    let sender = Arc::new(ScriptedSender::accepting());
    let dispatcher = BatchDispatcher::new(sender.clone());

    let result = dispatcher
        .process_jobs(jobs(2, 1), usize::MAX, 0)
        .await
        .unwrap();

    assert_eq!(result.successful_jobs, 2);
    assert_eq!(sender.total_calls(), 2);
}

#[tokio::test]
async fn test_cancelled_before_start_sends_nothing() {
    let sender = Arc::new(ScriptedSender::accepting());
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();
    let dispatcher = BatchDispatcher::new(sender.clone()).with_shutdown(shutdown);

    let result = dispatcher.process_jobs(jobs(4, 1), 2, 3).await.unwrap();

    assert_eq!(sender.total_calls(), 0);
    assert!(result.cancelled);
    assert_eq!(result.failed_jobs, 4);
    assert_eq!(result.successful_jobs, 0);
}

#[tokio::test]
async fn test_empty_job_list() {
    let dir = TempDir::new().unwrap();
    let sender = Arc::new(ScriptedSender::accepting());
    let dispatcher = BatchDispatcher::new(sender.clone())
        .with_failure_persister(FailurePersister::new(dir.path()));

    let result = dispatcher.process_jobs(Vec::new(), 4, 3).await.unwrap();

    assert_eq!(result.total_jobs, 0);
    assert_eq!(result.successful_jobs, 0);
    assert_eq!(result.failed_jobs, 0);
    assert!(result.failure_file.is_none());
    assert_eq!(result.stats.success_rate, 0.0);
    assert_eq!(result.stats.throughput, 0.0);
    assert_eq!(result.exit_status(), ExitStatus::CriticalError);
    assert_eq!(sender.total_calls(), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_zero_concurrency_is_an_error() {
    let dispatcher = BatchDispatcher::new(Arc::new(ScriptedSender::accepting()));
    let err = dispatcher.process_jobs(jobs(1, 1), 0, 3).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidConcurrency(0)));
}

#[tokio::test]
async fn test_progress_counts_recipients() {
    let sender = Arc::new(
        ScriptedSender::accepting()
            .script("key-1", vec![Outcome::Fail(api_error(404, "Not Found"))]),
    );
    let progress = Arc::new(ProgressReporter::new(ProgressMode::Disabled));
    let dispatcher = BatchDispatcher::new(sender).with_progress(progress.clone());

    let result = dispatcher.process_jobs(jobs(3, 4), 2, 3).await.unwrap();

    let stats = progress.snapshot();
    assert_eq!(stats.total, 12);
    assert_eq!(stats.sent, 8);
    assert_eq!(stats.failed, 4);
    assert_eq!(result.stats.sent, 8);
    assert!((result.stats.success_rate - 66.666).abs() < 0.1);
}
