use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for output operations
pub type Result<T> = std::result::Result<T, OutputError>;

/// Errors raised while writing results
#[derive(Error, Debug)]
pub enum OutputError {
    /// The output directory could not be created
    #[error("Cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Unknown output format name
    #[error("Unknown output format '{0}' (expected json or csv)")]
    UnknownFormat(String),
}
