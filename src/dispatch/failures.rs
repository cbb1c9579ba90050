//! Failed-recipient records and the failure file.
//!
//! After a run with failures the aggregator writes every failed recipient to
//! `<dir>/failed-YYYYMMDD-HHMMSS.json` so the batch can be inspected or
//! resubmitted with `mailcast retry`. Writes go through a temp file in the
//! same directory and are persisted with a rename.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::config::FAILURE_FILE_PREFIX;
use crate::Recipient;

/// Name of the per-user configuration directory.
pub const CONFIG_DIR_NAME: &str = "mailcast";

/// Failure file errors
#[derive(Debug, thiserror::Error)]
pub enum FailureFileError {
    /// No configuration directory could be resolved for this user
    #[error("could not determine the user configuration directory")]
    NoConfigDir,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

/// One recipient of a failed job, flattened for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecipient {
    /// Recipient address
    pub email: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Substitution data as supplied
    #[serde(default)]
    pub variables: BTreeMap<String, serde_json::Value>,
    /// Human-readable error of the job
    pub error: String,
    /// Best-effort numeric code, 0 when unknown
    pub error_code: u16,
    /// Whether the job's error was classified as transient
    pub retryable: bool,
    /// `variables` with every value rendered as a string
    #[serde(default)]
    pub variables_flat: BTreeMap<String, String>,
}

impl FailedRecipient {
    /// Build a record for `recipient` failing with `error`.
    pub fn new(
        recipient: &Recipient,
        error: impl Into<String>,
        error_code: u16,
        retryable: bool,
    ) -> Self {
        let variables = recipient.variables.clone().unwrap_or_default();
        let variables_flat = flatten_variables(&variables);
        Self {
            email: recipient.email.clone(),
            name: recipient.name.clone(),
            variables,
            error: error.into(),
            error_code,
            retryable,
            variables_flat,
        }
    }

    /// Rebuild the recipient for resubmission.
    pub fn to_recipient(&self) -> Recipient {
        Recipient {
            email: self.email.clone(),
            name: self.name.clone(),
            variables: if self.variables.is_empty() {
                None
            } else {
                Some(self.variables.clone())
            },
        }
    }
}

/// Render every value as a string: strings verbatim, everything else as JSON.
pub fn flatten_variables(
    variables: &BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, String> {
    variables
        .iter()
        .map(|(key, value)| {
            let flat = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (key.clone(), flat)
        })
        .collect()
}

/// Writes failure files into one directory.
#[derive(Debug, Clone)]
pub struct FailurePersister {
    dir: PathBuf,
}

impl FailurePersister {
    /// Persist into an explicit directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist into `<config dir>/mailcast`.
    pub fn in_config_dir() -> Result<Self, FailureFileError> {
        let base = dirs::config_dir().ok_or(FailureFileError::NoConfigDir)?;
        Ok(Self::new(base.join(CONFIG_DIR_NAME)))
    }

    /// Target directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `failures` to a fresh timestamped file and return its path.
    pub fn write(&self, failures: &[FailedRecipient]) -> Result<PathBuf, FailureFileError> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        self.write_named(&format!("{FAILURE_FILE_PREFIX}{stamp}"), failures)
    }

    /// Persist as `<base>.json`, or `<base>-N.json` when taken. Never replaces
    /// an existing file, even one created by another process.
    fn write_named(
        &self,
        base: &str,
        failures: &[FailedRecipient],
    ) -> Result<PathBuf, FailureFileError> {
        std::fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string_pretty(failures)?;
        let mut temp_file = tempfile::NamedTempFile::new_in(&self.dir)?;
        temp_file.write_all(json.as_bytes())?;
        temp_file.flush()?;
        temp_file.as_file().sync_all()?;

        let mut path = self.dir.join(format!("{base}.json"));
        let mut suffix = 1;
        loop {
            match temp_file.persist_noclobber(&path) {
                Ok(_) => break,
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Failure file exists, adding suffix");
                    temp_file = e.file;
                    path = self.dir.join(format!("{base}-{suffix}.json"));
                    suffix += 1;
                }
                Err(e) => return Err(e.error.into()),
            }
        }

        info!(
            path = %path.display(),
            recipients = failures.len(),
            "Saved failed recipients"
        );
        Ok(path)
    }

    /// Best-effort [`write`](Self::write): errors are logged and yield `None`.
    pub fn persist(&self, failures: &[FailedRecipient]) -> Option<PathBuf> {
        match self.write(failures) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(
                    dir = %self.dir.display(),
                    error = %e,
                    "Failed to save failed recipients"
                );
                None
            }
        }
    }
}

/// Read a failure file back.
pub fn load_failures(path: &Path) -> Result<Vec<FailedRecipient>, FailureFileError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Recipients to resubmit; only retryable ones unless `include_terminal`.
pub fn failures_to_recipients(
    failures: &[FailedRecipient],
    include_terminal: bool,
) -> Vec<Recipient> {
    failures
        .iter()
        .filter(|f| include_terminal || f.retryable)
        .map(FailedRecipient::to_recipient)
        .collect()
}

/// Write failures as CSV: fixed columns, then one column per variable key.
pub fn export_failures_csv<W: std::io::Write>(
    failures: &[FailedRecipient],
    writer: W,
) -> Result<(), FailureFileError> {
    let keys: BTreeSet<&String> = failures
        .iter()
        .flat_map(|f| f.variables_flat.keys())
        .collect();

    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec!["email", "name", "error", "error_code", "retryable"];
    header.extend(keys.iter().map(|k| k.as_str()));
    csv_writer.write_record(&header)?;

    for failure in failures {
        let mut row = vec![
            failure.email.clone(),
            failure.name.clone().unwrap_or_default(),
            failure.error.clone(),
            failure.error_code.to_string(),
            failure.retryable.to_string(),
        ];
        row.extend(
            keys.iter()
                .map(|k| failure.variables_flat.get(*k).cloned().unwrap_or_default()),
        );
        csv_writer.write_record(&row)?;
    }

    csv_writer.flush()?;
    Ok(())
}
