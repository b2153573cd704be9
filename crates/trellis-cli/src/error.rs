//! CLI error types

use thiserror::Error;
use trellis_core::CoreError;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors raised by CLI commands
#[derive(Error, Debug)]
pub enum CliError {
    /// The config file or a `TRELLIS_*` variable could not be read or parsed
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// An input file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An input file is not a JSON object of strings
    #[error("invalid input file: {0}")]
    Json(#[from] serde_json::Error),

    /// A key or value in an input file is not valid under the configured encoding
    #[error("cannot decode {0}")]
    Decode(String),

    /// Output bytes cannot be written under the configured encoding
    #[error("cannot encode {0}")]
    Encode(String),

    /// The tree rejected an operation, including an invalid branching factor
    #[error(transparent)]
    Core(#[from] CoreError),
}
