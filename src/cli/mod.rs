//! CLI command implementations

pub mod error;
pub mod export;
pub mod send;

pub use error::CliError;
pub use export::ExportArgs;
pub use send::{Cli, Commands, OutputFormat, RetryArgs, SendArgs};
