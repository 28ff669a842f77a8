//! # harvest-rs
//!
//! A polite, depth-bounded web crawler with pluggable content extractors.
//!
//! ## Components
//!
//! - **Core**: URL canonicalization, crawl settings, records and errors.
//! - **Frontier**: The queue of URLs to crawl and the set of URLs already seen.
//! - **Middleware**: Hooks around every network fetch (headers, rate limiting, proxies).
//! - **Fetcher**: HTTP and browser transports behind a response cache.
//! - **Extractors**: Page parsing and the ecommerce, news and social extractors.
//! - **Output**: JSON and CSV writers.
//! - **Crawler**: The worker pool tying the rest together.
//! - **Settings**: Loading crawl settings from TOML, JSON or YAML files.
//!
//! ## Example
//!
//! ```rust,no_run
//! use harvest_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     env_logger::init();
//!
//!     let settings = CrawlSettings::default().with_max_depth(1);
//!     let crawler = Crawler::from_settings(settings)?;
//!     let report = crawler.run(vec!["https://example.com".to_string()]).await?;
//!
//!     println!("Crawl {}: {}", report.state, report.stats);
//!     for record in &report.records {
//!         println!("{} [{}]", record.source_url, record.extractor_name);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub use harvest_core as core;
pub use harvest_crawler as crawler;
pub use harvest_extractors as extractors;
pub use harvest_fetcher as fetcher;
pub use harvest_frontier as frontier;
pub use harvest_middleware as middleware;
pub use harvest_output as output;

// Settings files
pub mod settings;

/// Prelude module that re-exports commonly used types
pub mod prelude {
    pub use harvest_core::config::{CrawlSettings, CrawlStrategy, ExtractorSelection};
    pub use harvest_core::error::{Error, NetworkError, Result};
    pub use harvest_core::record::{ExtractionRecord, FailedUrl, FieldMap};
    pub use harvest_core::request::FetchMode;
    pub use harvest_crawler::{CrawlReport, CrawlState, CrawlStats, Crawler, StopHandle};
    pub use harvest_extractors::{Extractor, ExtractorRegistry, ParsedContent};
    pub use harvest_fetcher::{Fetcher, ResponseCache, Transport};
    pub use harvest_frontier::{Frontier, MemoryFrontier};
    pub use harvest_middleware::{Middleware, MiddlewareChain};
    pub use harvest_output::{OutputFormat, OutputWriter};

    pub use crate::settings::{Settings, SettingsError, SettingsFormat};
}
