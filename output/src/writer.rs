use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use harvest_core::record::{ExtractionRecord, FailedUrl};
use log::info;

use crate::csv_writer::write_csv;
use crate::error::{OutputError, Result};
use crate::format::OutputFormat;
use crate::json_writer::{write_failures, write_json};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Path of the records file for a crawl finished at `at`
pub fn output_path(dir: &Path, format: OutputFormat, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "scraped_data_{}.{}",
        at.format(TIMESTAMP_FORMAT),
        format.extension()
    ))
}

fn failures_path(dir: &Path, at: DateTime<Utc>) -> PathBuf {
    dir.join(format!("failures_{}.json", at.format(TIMESTAMP_FORMAT)))
}

/// Files written for one crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFiles {
    /// The records file
    pub records: PathBuf,

    /// The failures file, written only when there were failures
    pub failures: Option<PathBuf>,
}

/// Writes a crawl's records and failures into a directory
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
    format: OutputFormat,
}

impl OutputWriter {
    /// Create a writer for a directory and format
    pub fn new(dir: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    /// The output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The records format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Write records, and failures if any, stamped with the current time
    pub fn write(&self, records: &[ExtractionRecord], failures: &[FailedUrl]) -> Result<OutputFiles> {
        self.write_at(records, failures, Utc::now())
    }

    /// Write records, and failures if any, stamped with `at`
    pub fn write_at(
        &self,
        records: &[ExtractionRecord],
        failures: &[FailedUrl],
        at: DateTime<Utc>,
    ) -> Result<OutputFiles> {
        fs::create_dir_all(&self.dir).map_err(|source| OutputError::CreateDir {
            path: self.dir.clone(),
            source,
        })?;

        let records_path = output_path(&self.dir, self.format, at);
        match self.format {
            OutputFormat::Json => write_json(&records_path, records)?,
            OutputFormat::Csv => write_csv(&records_path, records)?,
        }
        info!("Saved {} records to {}", records.len(), records_path.display());

        let failures_path = if failures.is_empty() {
            None
        } else {
            let path = failures_path(&self.dir, at);
            write_failures(&path, failures)?;
            info!("Saved {} failures to {}", failures.len(), path.display());
            Some(path)
        };

        Ok(OutputFiles {
            records: records_path,
            failures: failures_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use harvest_core::error::Error;
    use harvest_core::url::Url;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    #[test]
    fn test_output_path_format() {
        let path = output_path(Path::new("out"), OutputFormat::Csv, at());
        assert_eq!(path, Path::new("out/scraped_data_20240506_070809.csv"));
    }

    #[test]
    fn test_write_creates_directory_and_failures_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/results");
        let writer = OutputWriter::new(&dir, OutputFormat::Json);

        let url = Url::parse("http://a.test/").unwrap();
        let records = vec![ExtractionRecord::failed(url.clone(), "x", 0, "e")];
        let failures = vec![FailedUrl::invalid("not a url", 0, &Error::invalid_url("not a url", "relative"))];

        let files = writer.write_at(&records, &failures, at()).unwrap();
        assert_eq!(files.records, dir.join("scraped_data_20240506_070809.json"));
        assert!(files.records.exists());
        let failures_file = files.failures.unwrap();
        assert_eq!(failures_file, dir.join("failures_20240506_070809.json"));

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(failures_file).unwrap()).unwrap();
        assert_eq!(written[0]["kind"], "invalid_url");
    }

    #[test]
    fn test_no_failures_file_when_clean() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = OutputWriter::new(tmp.path(), OutputFormat::Csv);
        let files = writer.write_at(&[], &[], at()).unwrap();
        assert!(files.records.exists());
        assert!(files.failures.is_none());
    }

    #[test]
    fn test_unwritable_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let writer = OutputWriter::new(blocker.join("sub"), OutputFormat::Json);
        assert!(matches!(writer.write(&[], &[]), Err(OutputError::CreateDir { .. })));
    }
}
