//! CLI error types and conversions

use crate::compose::ComposeError;
use crate::dispatch::{DispatchError, FailureFileError};
use crate::sender::SendError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Dispatch could not start
    #[error("dispatch error: {0}")]
    DispatchError(#[from] DispatchError),

    /// Failure file could not be read or written
    #[error("failure file error: {0}")]
    FailureFileError(#[from] FailureFileError),

    /// Jobs could not be built
    #[error("compose error: {0}")]
    ComposeError(#[from] ComposeError),

    /// Sender could not be built
    #[error("sender error: {0}")]
    SendError(#[from] SendError),

    /// Input file could not be read
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Input file is not valid JSON
    #[error("parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
