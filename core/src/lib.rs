pub mod canonical;
pub mod config;
pub mod entry;
pub mod error;
pub mod record;
pub mod request;
pub mod response;

pub use canonical::{host_key, normalize, normalize_url, resolve_link};
pub use config::{CrawlSettings, CrawlStrategy, ExtractorSelection, LinkDiscovery};
pub use entry::UrlEntry;
pub use error::{Error, NetworkError, Result};
pub use record::{ExtractionRecord, FailedUrl, FailureKind, FieldMap, RecordStatus, UNKNOWN};
pub use request::{FetchMode, Request};
pub use response::FetchResult;

/// Re-export commonly used crates
pub use async_trait::async_trait;
pub use chrono;
pub use futures;
pub use serde;
pub use serde_json;
pub use url;
