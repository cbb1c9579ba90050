//! Logging and tracing setup used by the binary

use std::sync::Arc;
use std::time::Duration;

use mailcast::dispatch::BatchDispatcher;
use mailcast::sender::SendError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::mock_sender::{api_error, jobs, Outcome, ScriptedSender};

fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("mailcast=debug"))
        .with_test_writer()
        .try_init();
}

#[test]
fn test_env_filter_directives_parse() {
    for directive in ["info", "mailcast=debug", "warn,mailcast=trace"] {
        assert!(
            directive.parse::<EnvFilter>().is_ok(),
            "directive {directive} should parse"
        );
    }
}

#[test]
fn test_json_subscriber_builds() {
    // A global subscriber may already be installed by another test.
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new("mailcast=info"))
        .with_test_writer()
        .try_init();

    info!(jobs = 3, recipients = 1500, "Dispatching batch");
}

#[tokio::test]
async fn test_dispatch_logs_retries_and_failures() {
    init_test_tracing();

    let sender = Arc::new(
        ScriptedSender::accepting()
            .script("key-0", vec![Outcome::Fail(api_error(429, "Too Many Requests"))])
            .script(
                "key-1",
                vec![Outcome::Fail(SendError::Other("mailbox unavailable".to_string()))],
            ),
    );
    let dispatcher =
        BatchDispatcher::new(sender.clone()).with_backoff_unit(Duration::from_millis(1));

    let result = dispatcher.process_jobs(jobs(2, 1), 2, 1).await.unwrap();

    warn!(
        failed_jobs = result.failed_jobs,
        "Dispatch finished with failures"
    );
    assert_eq!(sender.calls_for("key-0"), 2);
    assert_eq!(sender.calls_for("key-1"), 1);
    assert_eq!(result.successful_jobs, 1);
    assert_eq!(result.failed_jobs, 1);
}
