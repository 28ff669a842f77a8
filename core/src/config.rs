// Crawl-wide configuration, shared immutably by every component

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::request::FetchMode;

/// Order in which the frontier yields URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrawlStrategy {
    /// FIFO, level by level
    #[default]
    BreadthFirst,
    /// LIFO, follow links as deep as possible first
    DepthFirst,
}

/// Whether outbound links are followed at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkDiscovery {
    /// Parse links and push them to the frontier
    Enabled,
    /// Fetch the seeds only; never look for links
    #[default]
    Disabled,
}

/// Which extractors run on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorSelection {
    /// First registered extractor that claims the page
    #[default]
    Auto,
    /// A specific extractor, forced
    Named(String),
    /// Every extractor that claims the page
    All,
}

impl fmt::Display for ExtractorSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractorSelection::Auto => write!(f, "auto"),
            ExtractorSelection::Named(name) => write!(f, "{}", name),
            ExtractorSelection::All => write!(f, "all"),
        }
    }
}

/// Configuration for a crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Maximum link hops from a seed
    pub max_depth: usize,

    /// Whether links are followed; `with_max_depth` keeps this in sync
    pub link_discovery: LinkDiscovery,

    /// Traversal order
    pub strategy: CrawlStrategy,

    /// Number of concurrent workers
    pub concurrency: usize,

    /// Stop after this many pages have been started
    pub max_pages: Option<usize>,

    /// Minimum seconds between two requests to the same host
    pub delay_secs: f64,

    /// Per-host overrides of `delay_secs`
    pub host_delays: HashMap<String, f64>,

    /// Upper bound of an adaptively increased host delay, in seconds
    pub max_delay_secs: f64,

    /// Multiplier applied to a host's delay after a 429 or repeated failures
    pub backoff_factor: f64,

    /// Per-request timeout in seconds
    pub timeout_secs: f64,

    /// Maximum number of fetch attempts per URL (including the first)
    pub retry_budget: u32,

    /// Initial retry delay in seconds
    pub retry_delay_secs: f64,

    /// Upper bound of the retry delay in seconds
    pub max_retry_delay_secs: f64,

    /// Transport used for every fetch
    pub fetch_mode: FetchMode,

    /// Whether responses are cached
    pub cache_enabled: bool,

    /// Cache entry lifetime in seconds; `None` never expires
    pub cache_ttl_secs: Option<u64>,

    /// Maximum number of cached responses
    pub cache_max_entries: usize,

    /// Directory of the persistent cache tier; `None` keeps the cache in memory
    pub cache_dir: Option<PathBuf>,

    /// User agent string
    pub user_agent: String,

    /// Pool of user agents to rotate through; empty means always `user_agent`
    pub user_agents: Vec<String>,

    /// Extra headers sent with every request
    pub headers: HashMap<String, String>,

    /// Proxy pool
    pub proxies: Vec<String>,

    /// Consecutive failures before a proxy is demoted
    pub proxy_max_failures: u32,

    /// Seconds a demoted proxy sits out
    pub proxy_cooldown_secs: u64,

    /// Hosts the crawl may visit; empty allows all
    pub allowed_domains: Vec<String>,

    /// Regexes a URL must match (any of) to be crawled
    pub include_patterns: Vec<String>,

    /// Regexes that exclude a URL
    pub exclude_patterns: Vec<String>,

    /// Extractor dispatch mode
    pub extractor: ExtractorSelection,

    /// Whether to log requests and responses
    pub log_requests: bool,

    /// Interval for logging stats in seconds; 0 disables
    pub stats_interval_secs: u64,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_depth: 0,
            link_discovery: LinkDiscovery::Disabled,
            strategy: CrawlStrategy::BreadthFirst,
            concurrency: 1,
            max_pages: None,
            delay_secs: 1.0,
            host_delays: HashMap::new(),
            max_delay_secs: 60.0,
            backoff_factor: 2.0,
            timeout_secs: 30.0,
            retry_budget: 3,
            retry_delay_secs: 2.0,
            max_retry_delay_secs: 60.0,
            fetch_mode: FetchMode::Http,
            cache_enabled: true,
            cache_ttl_secs: Some(3600),
            cache_max_entries: 1000,
            cache_dir: None,
            user_agent: format!("harvest_rs/{}", env!("CARGO_PKG_VERSION")),
            user_agents: Vec::new(),
            headers: HashMap::new(),
            proxies: Vec::new(),
            proxy_max_failures: 3,
            proxy_cooldown_secs: 60,
            allowed_domains: Vec::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            extractor: ExtractorSelection::Auto,
            log_requests: true,
            stats_interval_secs: 60,
        }
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

impl CrawlSettings {
    /// Set the depth bound and the matching link discovery flag
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self.link_discovery = if max_depth == 0 {
            LinkDiscovery::Disabled
        } else {
            LinkDiscovery::Enabled
        };
        self
    }

    /// Set the per-host politeness delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_secs = delay.as_secs_f64();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    /// Set the number of workers
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the retry budget and the initial retry delay
    pub fn with_retries(mut self, budget: u32, delay: Duration) -> Self {
        self.retry_budget = budget;
        self.retry_delay_secs = delay.as_secs_f64();
        self
    }

    /// Enable or disable the response cache
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Persist cached responses under a directory
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Set the extractor dispatch mode
    pub fn with_extractor(mut self, extractor: ExtractorSelection) -> Self {
        self.extractor = extractor;
        self
    }

    /// Whether links found on pages are followed
    pub fn follows_links(&self) -> bool {
        self.link_discovery == LinkDiscovery::Enabled
    }

    /// Politeness delay for a host
    pub fn delay_for(&self, host: &str) -> Duration {
        secs(self.host_delays.get(host).copied().unwrap_or(self.delay_secs))
    }

    /// Default politeness delay
    pub fn delay(&self) -> Duration {
        secs(self.delay_secs)
    }

    /// Upper bound for adaptive host delays
    pub fn max_delay(&self) -> Duration {
        secs(self.max_delay_secs)
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }

    /// Initial retry delay
    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay_secs)
    }

    /// Retry delay cap
    pub fn max_retry_delay(&self) -> Duration {
        secs(self.max_retry_delay_secs)
    }

    /// Cache lifetime, `None` meaning entries never expire
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    /// Cooldown of a demoted proxy
    pub fn proxy_cooldown(&self) -> Duration {
        Duration::from_secs(self.proxy_cooldown_secs)
    }

    /// Stats logging interval, if enabled
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }

    /// Check the settings for values no crawl can run with
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be at least 1"));
        }
        if self.retry_budget == 0 {
            return Err(Error::config("retry_budget must be at least 1"));
        }
        let durations = [
            ("delay_secs", self.delay_secs),
            ("max_delay_secs", self.max_delay_secs),
            ("timeout_secs", self.timeout_secs),
            ("retry_delay_secs", self.retry_delay_secs),
            ("max_retry_delay_secs", self.max_retry_delay_secs),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        for (host, value) in &self.host_delays {
            if !value.is_finite() || *value < 0.0 {
                return Err(Error::config(format!("invalid delay {} for host {}", value, host)));
            }
        }
        if self.timeout_secs == 0.0 {
            return Err(Error::config("timeout_secs must be greater than 0"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(Error::config("backoff_factor must be at least 1.0"));
        }
        if self.max_depth > 0 && !self.follows_links() {
            log::warn!(
                "max_depth is {} but link discovery is disabled; only seeds will be fetched",
                self.max_depth
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = CrawlSettings::default();
        assert_eq!(settings.max_depth, 0);
        assert!(!settings.follows_links());
        assert_eq!(settings.delay(), Duration::from_secs(1));
        assert_eq!(settings.timeout(), Duration::from_secs(30));
        assert_eq!(settings.retry_budget, 3);
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.cache_ttl(), Some(Duration::from_secs(3600)));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_with_max_depth_sets_link_discovery() {
        let settings = CrawlSettings::default().with_max_depth(2);
        assert!(settings.follows_links());
        let settings = settings.with_max_depth(0);
        assert!(!settings.follows_links());
    }

    #[test]
    fn test_host_delay_override() {
        let mut settings = CrawlSettings::default();
        settings.host_delays.insert("slow.test".into(), 5.0);
        assert_eq!(settings.delay_for("slow.test"), Duration::from_secs(5));
        assert_eq!(settings.delay_for("fast.test"), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(CrawlSettings::default().with_concurrency(0).validate().is_err());

        let mut settings = CrawlSettings::default();
        settings.delay_secs = -1.0;
        assert!(settings.validate().is_err());

        let mut settings = CrawlSettings::default();
        settings.timeout_secs = f64::NAN;
        assert!(settings.validate().is_err());

        let mut settings = CrawlSettings::default();
        settings.retry_budget = 0;
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_deserialize_partial() {
        let settings: CrawlSettings =
            serde_json::from_str(r#"{"max_depth": 2, "link_discovery": "enabled", "extractor": {"named": "news"}}"#)
                .unwrap();
        assert_eq!(settings.max_depth, 2);
        assert!(settings.follows_links());
        assert_eq!(settings.extractor, ExtractorSelection::Named("news".into()));
        assert_eq!(settings.retry_budget, 3);
    }
}
