use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use harvest_core::record::{ExtractionRecord, RecordStatus};
use log::debug;
use serde_json::Value;

use crate::error::Result;

/// Columns every CSV starts with, before the field columns
pub const LEADING_COLUMNS: &[&str] = &[
    "source_url",
    "extractor",
    "depth",
    "status",
    "error",
    "extracted_at",
];

/// Render a field value as a single CSV cell.
///
/// Scalars are written as-is, arrays of scalars are joined with `;`, and
/// objects or nested arrays are written as compact JSON.
pub fn flatten_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(flatten_value)
            .collect::<Vec<_>>()
            .join(";"),
        other => other.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Sorted union of field names across all records
fn field_columns(records: &[ExtractionRecord]) -> Vec<String> {
    records
        .iter()
        .flat_map(|r| r.fields.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Write records as CSV to any writer
pub fn write_csv_to<W: Write>(out: W, records: &[ExtractionRecord]) -> Result<()> {
    let columns = field_columns(records);
    let mut writer = csv::Writer::from_writer(out);

    let header = LEADING_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(columns.iter().cloned());
    writer.write_record(header)?;

    for record in records {
        let status = match record.status {
            RecordStatus::Ok => "ok",
            RecordStatus::Error => "error",
        };
        let leading = [
            record.source_url.to_string(),
            record.extractor_name.clone(),
            record.depth.to_string(),
            status.to_string(),
            record.error.clone().unwrap_or_default(),
            record.extracted_at.to_rfc3339(),
        ];
        let fields = columns
            .iter()
            .map(|c| record.fields.get(c).map(flatten_value).unwrap_or_default());
        writer.write_record(leading.into_iter().chain(fields))?;
    }

    writer.flush()?;
    Ok(())
}

/// Write records as flattened CSV with a stable column union
pub fn write_csv(path: &Path, records: &[ExtractionRecord]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv_to(std::io::BufWriter::new(file), records)?;
    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::record::FieldMap;
    use harvest_core::url::Url;
    use serde_json::json;

    fn record(url: &str, extractor: &str, fields: Value) -> ExtractionRecord {
        let fields: FieldMap = serde_json::from_value(fields).unwrap();
        ExtractionRecord::new(Url::parse(url).unwrap(), extractor, 0, fields, &[])
    }

    #[test]
    fn test_flatten_value() {
        assert_eq!(flatten_value(&json!("a")), "a");
        assert_eq!(flatten_value(&json!(1.5)), "1.5");
        assert_eq!(flatten_value(&json!(true)), "true");
        assert_eq!(flatten_value(&json!(null)), "");
        assert_eq!(flatten_value(&json!(["x", 2, false])), "x;2;false");
        assert_eq!(flatten_value(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(flatten_value(&json!([{"a": 1}])), r#"[{"a":1}]"#);
    }

    #[test]
    fn test_columns_are_union_of_fields() {
        let records = vec![
            record("http://a.test/1", "news", json!({"headline": "H", "tags": ["a", "b"]})),
            record("http://a.test/2", "ecommerce", json!({"price": "9.99", "name": "N"})),
        ];

        let mut buf = Vec::new();
        write_csv_to(&mut buf, &records).unwrap();

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(
            headers,
            vec![
                "source_url", "extractor", "depth", "status", "error", "extracted_at",
                "headline", "name", "price", "tags",
            ]
        );

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "http://a.test/1");
        assert_eq!(&rows[0][3], "ok");
        assert_eq!(&rows[0][6], "H");
        assert_eq!(&rows[0][7], "");
        assert_eq!(&rows[0][9], "a;b");
        assert_eq!(&rows[1][8], "9.99");
    }

    #[test]
    fn test_error_record_row() {
        let records = vec![ExtractionRecord::failed(
            Url::parse("http://a.test/").unwrap(),
            "broken",
            2,
            "bad, \"quoted\" message",
        )];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&path, &records).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[2], "2");
        assert_eq!(&row[3], "error");
        assert_eq!(&row[4], "bad, \"quoted\" message");
        assert_eq!(row.len(), LEADING_COLUMNS.len());
    }
}
