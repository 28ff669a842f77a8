use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

use crate::error::{Error, NetworkError};

/// Marker stored in a field an extractor could not determine
pub const UNKNOWN: &str = "unknown";

/// Extracted fields, ordered by name so output is stable
pub type FieldMap = BTreeMap<String, serde_json::Value>;

/// Whether a record carries data or an extraction failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Ok,
    Error,
}

/// Structured data produced by one extractor for one page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    /// Page the data came from
    pub source_url: Url,

    /// Name of the extractor that produced the record
    #[serde(rename = "extractor")]
    pub extractor_name: String,

    /// Link hops from the seed
    pub depth: usize,

    /// Outcome of the extraction
    pub status: RecordStatus,

    /// Failure description when `status` is `Error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Extracted fields
    pub fields: FieldMap,

    /// When the record was created
    pub extracted_at: DateTime<Utc>,
}

impl ExtractionRecord {
    /// Create a successful record.
    ///
    /// Every name in `schema` that is missing from `fields`, or is null, is set
    /// to [`UNKNOWN`].
    pub fn new(
        source_url: Url,
        extractor_name: impl Into<String>,
        depth: usize,
        mut fields: FieldMap,
        schema: &[&str],
    ) -> Self {
        for name in schema {
            let entry = fields
                .entry((*name).to_string())
                .or_insert(serde_json::Value::Null);
            if entry.is_null() {
                *entry = serde_json::Value::String(UNKNOWN.to_string());
            }
        }
        Self {
            source_url,
            extractor_name: extractor_name.into(),
            depth,
            status: RecordStatus::Ok,
            error: None,
            fields,
            extracted_at: Utc::now(),
        }
    }

    /// Create a record marking a failed extraction
    pub fn failed(
        source_url: Url,
        extractor_name: impl Into<String>,
        depth: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_url,
            extractor_name: extractor_name.into(),
            depth,
            status: RecordStatus::Error,
            error: Some(message.into()),
            fields: FieldMap::new(),
            extracted_at: Utc::now(),
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    /// Whether a field holds the unknown marker
    pub fn is_unknown(&self, key: &str) -> bool {
        matches!(self.fields.get(key), Some(serde_json::Value::String(s)) if s == UNKNOWN)
    }

    /// Whether the extraction succeeded
    pub fn is_ok(&self) -> bool {
        self.status == RecordStatus::Ok
    }
}

/// Why a requested URL produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The URL could not be parsed or normalized
    InvalidUrl,
    /// Transport failure after the retry budget was spent
    Fetch,
    /// The server answered with a non-2xx status
    HttpStatus,
    /// The response was not an HTML document
    Rejected,
    /// Still queued when the crawl ended early
    Skipped,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::InvalidUrl => "invalid_url",
            FailureKind::Fetch => "fetch",
            FailureKind::HttpStatus => "http_status",
            FailureKind::Rejected => "rejected",
            FailureKind::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// A requested URL that did not yield a page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedUrl {
    /// The URL as requested (raw input for invalid seeds)
    pub url: String,

    /// Depth it was requested at
    pub depth: usize,

    /// Failure category
    pub kind: FailureKind,

    /// Human readable cause
    pub message: String,

    /// HTTP status, for `HttpStatus` failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Network cause, for `Fetch` failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<NetworkError>,

    /// Number of fetch attempts made
    pub attempts: u32,
}

impl FailedUrl {
    /// Failure for an input that is not a crawlable URL
    pub fn invalid(url: impl Into<String>, depth: usize, error: &Error) -> Self {
        Self {
            url: url.into(),
            depth,
            kind: FailureKind::InvalidUrl,
            message: error.to_string(),
            status: None,
            cause: None,
            attempts: 0,
        }
    }

    /// Failure for a fetch that kept failing
    pub fn fetch(url: &Url, depth: usize, error: &Error, attempts: u32) -> Self {
        Self {
            url: url.to_string(),
            depth,
            kind: FailureKind::Fetch,
            message: error.to_string(),
            status: None,
            cause: error.network_cause().cloned(),
            attempts,
        }
    }

    /// Failure for a non-2xx response
    pub fn http_status(url: &Url, depth: usize, status: u16, attempts: u32) -> Self {
        Self {
            url: url.to_string(),
            depth,
            kind: FailureKind::HttpStatus,
            message: format!("HTTP status {}", status),
            status: Some(status),
            cause: None,
            attempts,
        }
    }

    /// Failure for a response that is not HTML
    pub fn rejected(url: &Url, depth: usize, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            url: url.to_string(),
            depth,
            kind: FailureKind::Rejected,
            message: reason.into(),
            status: None,
            cause: None,
            attempts,
        }
    }

    /// A queued URL that was never fetched
    pub fn skipped(url: &Url, depth: usize, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            depth,
            kind: FailureKind::Skipped,
            message: reason.into(),
            status: None,
            cause: None,
            attempts: 0,
        }
    }
}
