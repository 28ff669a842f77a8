// Crawl statistics and the final report

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use harvest_core::record::{ExtractionRecord, FailedUrl};

/// Lifecycle of a crawler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlState {
    /// Created, not yet run
    Idle,
    /// Workers are pulling from the frontier
    Running,
    /// The frontier drained, or the crawl was stopped or hit its page limit
    Completed,
    /// An unrecoverable error ended the crawl early
    Aborted,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrawlState::Idle => "idle",
            CrawlState::Running => "running",
            CrawlState::Completed => "completed",
            CrawlState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Counters for a crawl
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlStats {
    /// Pages fetched and handed to the extractors
    pub pages_fetched: usize,

    /// Pages served from the response cache
    pub cache_hits: usize,

    /// Extraction records produced
    pub records: usize,

    /// URLs that produced no record
    pub failures: usize,

    /// Fetch attempts beyond the first
    pub retries: usize,

    /// Links found on fetched pages
    pub links_discovered: usize,

    /// Links accepted by the frontier
    pub links_enqueued: usize,

    /// URLs left in the frontier when the crawl ended
    pub pending: usize,

    /// Wall time of the crawl
    pub duration: Duration,
}

impl CrawlStats {
    /// Pages fetched per second of crawl time
    pub fn pages_per_second(&self) -> f64 {
        let seconds = self.duration.as_secs_f64();
        if seconds > 0.0 {
            self.pages_fetched as f64 / seconds
        } else {
            0.0
        }
    }
}

impl fmt::Display for CrawlStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages ({} cached), {} records, {} failures, {} retries, {} links found, {} enqueued, {} pending, {:.2} pages/s, {:.2}s elapsed",
            self.pages_fetched,
            self.cache_hits,
            self.records,
            self.failures,
            self.retries,
            self.links_discovered,
            self.links_enqueued,
            self.pending,
            self.pages_per_second(),
            self.duration.as_secs_f64(),
        )
    }
}

/// Everything a finished crawl produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    /// Final state, `Completed` or `Aborted`
    pub state: CrawlState,

    /// Extraction records in the order pages finished
    pub records: Vec<ExtractionRecord>,

    /// URLs that produced no record
    pub failures: Vec<FailedUrl>,

    /// Final counters
    pub stats: CrawlStats,

    /// Why the crawl aborted, if it did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl CrawlReport {
    /// Whether the crawl ran to completion
    pub fn is_completed(&self) -> bool {
        self.state == CrawlState::Completed
    }

    /// Records extracted from a page
    pub fn records_for<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a ExtractionRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.source_url.as_str() == url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_per_second() {
        let stats = CrawlStats {
            pages_fetched: 10,
            duration: Duration::from_secs(4),
            ..Default::default()
        };
        assert_eq!(stats.pages_per_second(), 2.5);
        assert_eq!(CrawlStats::default().pages_per_second(), 0.0);
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_value(CrawlState::Aborted).unwrap(), "aborted");
        assert_eq!(CrawlState::Completed.to_string(), "completed");
    }
}
