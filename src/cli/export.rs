//! Export command: failure file to CSV

use crate::dispatch::failures::{export_failures_csv, load_failures};
use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;

use super::CliError;

/// Export command arguments
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Failure file written by a previous run
    #[arg(long)]
    pub failures: PathBuf,

    /// CSV destination (default: stdout)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl ExportArgs {
    /// Execute the export command.
    pub fn execute(&self) -> Result<(), CliError> {
        let failures = load_failures(&self.failures)?;

        match &self.output {
            Some(path) => {
                let writer = BufWriter::new(File::create(path)?);
                export_failures_csv(&failures, writer)?;
                info!(
                    rows = failures.len(),
                    "Exported failed recipients to {}",
                    path.display()
                );
            }
            None => export_failures_csv(&failures, std::io::stdout().lock())?,
        }
        Ok(())
    }
}
