//! Send and retry command implementation

use crate::compose::{BatchPlan, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
use crate::dispatch::config::{DEFAULT_MAX_RETRIES, MAX_CONCURRENCY};
use crate::dispatch::failures::{failures_to_recipients, load_failures};
use crate::dispatch::{
    BatchDispatcher, BatchResult, ExitStatus, FailurePersister, ProgressMode, ProgressReporter,
};
use crate::sender::http::{DEFAULT_API_URL, DEFAULT_SANDBOX_URL};
use crate::sender::{Endpoint, HttpSender};
use crate::shutdown::SharedShutdown;
use crate::Recipient;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{CliError, ExportArgs};

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Parse and validate batch size
fn parse_batch_size(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 || value > MAX_BATCH_SIZE {
        return Err(format!("batch size must be between 1 and {MAX_BATCH_SIZE}"));
    }
    Ok(value)
}

/// Mailcast CLI
#[derive(Parser, Debug)]
#[command(name = "mailcast")]
#[command(about = "Send transactional email in concurrent batches", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Number of batches sent concurrently (default: 4, max: 64)
    #[arg(long, global = true, default_value = "4", value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Retries per batch after the first attempt (default: 3, range: 0-20)
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_MAX_RETRIES,
        value_parser = clap::value_parser!(u32).range(0..=20)
    )]
    pub max_retries: u32,

    /// Recipients per batch request (default and max: 500)
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_BATCH_SIZE,
        value_parser = parse_batch_size
    )]
    pub batch_size: usize,

    /// Debug logging and periodic progress lines instead of a progress bar
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    /// Disable progress reporting
    #[arg(long, global = true, default_value_t = false)]
    pub no_progress: bool,

    /// Send to a sandbox inbox instead of delivering
    #[arg(long, global = true, default_value_t = false, requires = "inbox_id")]
    pub sandbox: bool,

    /// Sandbox inbox to deliver into
    #[arg(long, global = true)]
    pub inbox_id: Option<u64>,

    /// Override the API base URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// API token
    #[arg(long, global = true, env = "MAILCAST_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Directory for failure files (default: the user config directory)
    #[arg(long, global = true)]
    pub failures_dir: Option<PathBuf>,

    /// Expose Prometheus metrics on this address
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Resolve the API endpoint from `--sandbox`, `--inbox-id` and `--api-url`.
    pub fn endpoint(&self) -> Result<Endpoint, CliError> {
        if self.sandbox {
            let inbox_id = self.inbox_id.ok_or_else(|| {
                CliError::InvalidArgument("--sandbox requires --inbox-id".to_string())
            })?;
            return Ok(Endpoint::Sandbox {
                base_url: self
                    .api_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SANDBOX_URL.to_string()),
                inbox_id,
            });
        }
        Ok(Endpoint::Production {
            base_url: self
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        })
    }

    /// Where failure files go.
    pub fn failure_persister(&self) -> Result<FailurePersister, CliError> {
        match &self.failures_dir {
            Some(dir) => Ok(FailurePersister::new(dir.clone())),
            None => Ok(FailurePersister::in_config_dir()?),
        }
    }

    /// Progress mode for this invocation.
    pub fn progress_mode(&self) -> ProgressMode {
        ProgressMode::detect(self.verbose, !self.no_progress)
    }

    fn build_sender(&self) -> Result<HttpSender, CliError> {
        let token = self
            .api_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                CliError::ConfigurationError(
                    "API token missing: pass --api-token or set MAILCAST_API_TOKEN".to_string(),
                )
            })?;
        Ok(HttpSender::with_default_client(self.endpoint()?, token)?)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a message to a recipient list
    Send(SendArgs),

    /// Resubmit recipients from a failure file
    Retry(RetryArgs),

    /// Export a failure file as CSV
    Export(ExportArgs),
}

/// Send command arguments
#[derive(Parser, Debug)]
pub struct SendArgs {
    /// Base message (JSON object with from, subject, body or template)
    #[arg(long)]
    pub message: PathBuf,

    /// Recipients (JSON array of {email, name, variables})
    #[arg(long)]
    pub recipients: PathBuf,
}

impl SendArgs {
    /// Execute the send command.
    pub async fn execute(
        &self,
        cli: &Cli,
        shutdown: SharedShutdown,
    ) -> Result<ExitStatus, CliError> {
        let message = load_message(&self.message)?;
        let recipients = load_recipients(&self.recipients)?;
        info!(
            recipients = recipients.len(),
            "Loaded recipients from {}",
            self.recipients.display()
        );
        dispatch(cli, message, recipients, shutdown).await
    }
}

/// Retry command arguments
#[derive(Parser, Debug)]
pub struct RetryArgs {
    /// Failure file written by a previous run
    #[arg(long)]
    pub failures: PathBuf,

    /// Base message to resend
    #[arg(long)]
    pub message: PathBuf,

    /// Include recipients whose failure was not retryable
    #[arg(long, default_value_t = false)]
    pub all: bool,
}

impl RetryArgs {
    /// Execute the retry command.
    pub async fn execute(
        &self,
        cli: &Cli,
        shutdown: SharedShutdown,
    ) -> Result<ExitStatus, CliError> {
        let message = load_message(&self.message)?;
        let failures = load_failures(&self.failures)?;
        let recipients = failures_to_recipients(&failures, self.all);

        let skipped = failures.len() - recipients.len();
        if skipped > 0 {
            warn!(
                skipped,
                "Skipping recipients with non-retryable failures (use --all to include them)"
            );
        }
        if recipients.is_empty() {
            info!("Nothing to retry in {}", self.failures.display());
            match cli.output_format {
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({"success": true, "retried": 0}))
                }
                OutputFormat::Human => println!("Nothing to retry."),
            }
            return Ok(ExitStatus::Success);
        }

        dispatch(cli, message, recipients, shutdown).await
    }
}

async fn dispatch(
    cli: &Cli,
    message: serde_json::Value,
    recipients: Vec<Recipient>,
    shutdown: SharedShutdown,
) -> Result<ExitStatus, CliError> {
    let plan = BatchPlan::new(message, recipients, cli.batch_size)?;
    let jobs = plan.jobs();
    info!(
        jobs = jobs.len(),
        recipients = plan.recipient_count(),
        batch_size = cli.batch_size,
        "Composed batch jobs"
    );

    let sender = cli.build_sender()?;
    let progress = Arc::new(ProgressReporter::new(cli.progress_mode()));
    let dispatcher = BatchDispatcher::new(Arc::new(sender))
        .with_progress(progress)
        .with_shutdown(shutdown)
        .with_failure_persister(cli.failure_persister()?);

    let result = dispatcher
        .process_jobs(jobs, cli.concurrency, cli.max_retries)
        .await?;

    print_result(cli.output_format, &result);
    Ok(result.exit_status())
}

/// Read the base message.
pub fn load_message(path: &Path) -> Result<serde_json::Value, CliError> {
    let contents = std::fs::read_to_string(path)?;
    let message: serde_json::Value = serde_json::from_str(&contents)?;
    if !message.is_object() {
        return Err(CliError::InvalidArgument(format!(
            "{} must contain a JSON object",
            path.display()
        )));
    }
    Ok(message)
}

/// Read the recipient list.
pub fn load_recipients(path: &Path) -> Result<Vec<Recipient>, CliError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

fn print_result(format: OutputFormat, result: &BatchResult) {
    match format {
        OutputFormat::Json => output_json(result),
        OutputFormat::Human => output_human(result),
    }
}

/// Summary as a single JSON object.
pub fn summary_json(result: &BatchResult) -> serde_json::Value {
    let status = result.exit_status();
    serde_json::json!({
        "success": status == ExitStatus::Success,
        "exit_code": status.code(),
        "cancelled": result.cancelled,
        "total_jobs": result.total_jobs,
        "successful_jobs": result.successful_jobs,
        "failed_jobs": result.failed_jobs,
        "total_recipients": result.total_recipients,
        "successful_recipients": result.successful_recipients,
        "failed_recipients": result.failed_recipients.len(),
        "success_rate": result.stats.success_rate,
        "duration_secs": result.stats.duration.as_secs_f64(),
        "throughput": result.stats.throughput,
        "failure_file": result.failure_file.as_ref().map(|p| p.display().to_string()),
        "errors": result.errors.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
    })
}

fn output_json(result: &BatchResult) {
    match serde_json::to_string(&summary_json(result)) {
        Ok(line) => println!("{line}"),
        Err(e) => error!("Failed to serialize summary: {}", e),
    }
}

fn output_human(result: &BatchResult) {
    match result.exit_status() {
        ExitStatus::Success => println!("\nSend completed successfully!"),
        ExitStatus::PartialSuccess => println!("\nSend completed with failures."),
        ExitStatus::AllFailed | ExitStatus::CriticalError => eprintln!("\nSend failed!"),
    }
    if result.cancelled {
        println!("Run was cancelled before all batches finished.");
    }
    println!(
        "Batches: {} sent, {} failed of {}",
        result.successful_jobs, result.failed_jobs, result.total_jobs
    );
    println!(
        "Recipients: {} sent, {} failed of {}",
        result.successful_recipients,
        result.failed_recipients.len(),
        result.total_recipients
    );
    println!("{}", result.stats.summary_line());
    if let Some(path) = &result.failure_file {
        println!("Failed recipients saved to: {}", path.display());
        println!(
            "Resend with: mailcast retry --failures {} --message <message.json>",
            path.display()
        );
    }
    for err in result.errors.iter().take(5) {
        eprintln!("Error: {err}");
    }
    if result.errors.len() > 5 {
        eprintln!("... and {} more errors", result.errors.len() - 5);
    }
}
