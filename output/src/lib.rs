//! Persisting crawl results as JSON or flattened CSV.

mod csv_writer;
mod error;
mod format;
mod json_writer;
mod writer;

pub use csv_writer::{flatten_value, write_csv, write_csv_to, LEADING_COLUMNS};
pub use error::{OutputError, Result};
pub use format::OutputFormat;
pub use json_writer::{write_failures, write_json};
pub use writer::{output_path, OutputFiles, OutputWriter};
