//! Main entry point for the mailcast CLI

use clap::Parser;
use mailcast::cli::{Cli, Commands};
use mailcast::dispatch::ExitStatus;
use mailcast::shutdown::ShutdownCoordinator;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing(verbose: bool) {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let default_directive = if verbose { "mailcast=debug" } else { "mailcast=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // Logs share stderr with the progress bar; stdout carries the summary.
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = mailcast::metrics::init_metrics(addr).await {
            error!("Failed to start metrics exporter: {}", e);
            std::process::exit(ExitStatus::CriticalError.code());
        }
    }

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - cancelling remaining batches...");
                shutdown.request_shutdown();
            }
        }
    });

    let result = match cli.command {
        Commands::Send(ref args) => args
            .execute(&cli, shutdown.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Retry(ref args) => args
            .execute(&cli, shutdown.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Export(ref args) => args
            .execute()
            .map(|()| ExitStatus::Success)
            .map_err(|e| anyhow::anyhow!(e)),
    };

    match result {
        Ok(status) => std::process::exit(status.code()),
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("Error: {e}");
            std::process::exit(ExitStatus::CriticalError.code());
        }
    }
}
