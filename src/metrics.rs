//! Dispatch metrics
//!
//! Recorded through the `metrics` facade, so every call is a no-op until the
//! binary installs the Prometheus exporter with [`init_metrics`].

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

static METRICS_INITIALIZED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

/// Install the Prometheus exporter on `addr`. Idempotent.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "dispatch_jobs_total",
        Unit::Count,
        "Jobs finished, labelled by outcome"
    );
    describe_counter!(
        "dispatch_recipients_total",
        Unit::Count,
        "Recipients finished, labelled by outcome"
    );
    describe_counter!(
        "dispatch_send_attempts_total",
        Unit::Count,
        "Calls made to the sending API"
    );
    describe_counter!(
        "dispatch_retries_total",
        Unit::Count,
        "Retries scheduled after a transient failure"
    );
    describe_histogram!(
        "dispatch_job_duration_seconds",
        Unit::Seconds,
        "Time from first attempt to final outcome per job"
    );
    describe_histogram!(
        "dispatch_retry_backoff_seconds",
        Unit::Seconds,
        "Backoff waited before a retry"
    );

    *initialized = true;
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// Whether [`init_metrics`] has run.
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

fn outcome_label(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Record the final outcome of one job.
pub fn record_job(success: bool, attempts: u32, recipients: usize, duration: Duration) {
    counter!("dispatch_jobs_total", "outcome" => outcome_label(success)).increment(1);
    counter!("dispatch_recipients_total", "outcome" => outcome_label(success))
        .increment(recipients as u64);
    counter!("dispatch_send_attempts_total").increment(u64::from(attempts));
    histogram!("dispatch_job_duration_seconds").record(duration.as_secs_f64());
}

/// Record a scheduled retry.
pub fn record_retry(attempt: u32, backoff: Duration) {
    counter!("dispatch_retries_total", "attempt" => attempt.to_string()).increment(1);
    histogram!("dispatch_retry_backoff_seconds").record(backoff.as_secs_f64());
}
