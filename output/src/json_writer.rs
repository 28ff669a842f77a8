use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use harvest_core::record::{ExtractionRecord, FailedUrl};
use log::debug;

use crate::error::Result;

/// Write records as a pretty-printed JSON array
pub fn write_json(path: &Path, records: &[ExtractionRecord]) -> Result<()> {
    write_array(path, records)?;
    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Write the failures list as a pretty-printed JSON array
pub fn write_failures(path: &Path, failures: &[FailedUrl]) -> Result<()> {
    write_array(path, failures)?;
    debug!("Wrote {} failures to {}", failures.len(), path.display());
    Ok(())
}

fn write_array<T: serde::Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, items)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
