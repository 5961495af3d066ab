//! Parser error types for run analysis

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a parse.
///
/// Everything that goes wrong on a single line is counted in
/// [`ParseDiagnostics`](crate::services::run_analyzer::models::ParseDiagnostics)
/// instead; only failures on the input itself end up here.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decompress {path}: {source}")]
    Decompress {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Result type alias for parser operations
pub type ParseResult<T> = Result<T, ParseError>;
