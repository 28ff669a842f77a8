use std::time::Duration;

use harvest_core::async_trait;
use harvest_core::config::CrawlSettings;
use harvest_core::error::{Error, Result};
use harvest_core::request::Request;
use harvest_core::response::FetchResult;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::Middleware;

/// How the next proxy is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyStrategy {
    /// Cycle through the pool in order
    #[default]
    RoundRobin,
    /// Prefer the proxy whose last failure is oldest (or that never failed)
    LeastRecentlyFailed,
}

#[derive(Debug)]
struct ProxyEntry {
    url: String,
    consecutive_failures: u32,
    total_failures: u64,
    total_successes: u64,
    last_failure: Option<Instant>,
    demoted_until: Option<Instant>,
}

impl ProxyEntry {
    fn new(url: String) -> Self {
        Self {
            url,
            consecutive_failures: 0,
            total_failures: 0,
            total_successes: 0,
            last_failure: None,
            demoted_until: None,
        }
    }

    fn is_available(&self, now: Instant) -> bool {
        self.demoted_until.map_or(true, |until| until <= now)
    }
}

#[derive(Debug)]
struct ProxyPool {
    entries: Vec<ProxyEntry>,
    cursor: usize,
}

/// Per-proxy counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyStats {
    /// Proxy URL
    pub url: String,
    /// Whether the proxy is currently in use
    pub available: bool,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Lifetime failures
    pub total_failures: u64,
    /// Lifetime successes
    pub total_successes: u64,
}

/// A middleware that routes requests through a rotating pool of proxies.
///
/// A proxy that fails `max_failures` times in a row is demoted for
/// `cooldown`; once the cooldown passes it rejoins the rotation. When every
/// proxy is demoted, the least recently failed one is used anyway.
pub struct ProxyRotationMiddleware {
    pool: Mutex<ProxyPool>,
    strategy: ProxyStrategy,
    max_failures: u32,
    cooldown: Duration,
}

impl ProxyRotationMiddleware {
    /// Create a new ProxyRotationMiddleware
    pub fn new(proxies: Vec<String>, strategy: ProxyStrategy) -> Self {
        Self {
            pool: Mutex::new(ProxyPool {
                entries: proxies.into_iter().map(ProxyEntry::new).collect(),
                cursor: 0,
            }),
            strategy,
            max_failures: 3,
            cooldown: Duration::from_secs(60),
        }
    }

    /// Create the proxy rotation described by the settings
    pub fn from_settings(settings: &CrawlSettings) -> Self {
        Self::new(settings.proxies.clone(), ProxyStrategy::RoundRobin)
            .with_max_failures(settings.proxy_max_failures)
            .with_cooldown(settings.proxy_cooldown())
    }

    /// Set the number of consecutive failures that demotes a proxy
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures.max(1);
        self
    }

    /// Set how long a demoted proxy sits out
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Pick the proxy for the next request
    pub async fn select(&self) -> Option<String> {
        let mut pool = self.pool.lock().await;
        if pool.entries.is_empty() {
            return None;
        }

        let now = Instant::now();
        for entry in pool.entries.iter_mut() {
            if entry.demoted_until.is_some() && entry.is_available(now) {
                info!("Proxy {} recovered after cooldown", entry.url);
                entry.demoted_until = None;
                entry.consecutive_failures = 0;
            }
        }

        let len = pool.entries.len();
        let chosen = match self.strategy {
            ProxyStrategy::RoundRobin => {
                let start = pool.cursor;
                let found = (0..len)
                    .map(|offset| (start + offset) % len)
                    .find(|&i| pool.entries[i].is_available(now));
                if let Some(i) = found {
                    pool.cursor = (i + 1) % len;
                }
                found
            }
            ProxyStrategy::LeastRecentlyFailed => pool
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.is_available(now))
                .min_by_key(|(_, e)| e.last_failure)
                .map(|(i, _)| i),
        };

        let index = match chosen {
            Some(index) => index,
            None => {
                let index = pool
                    .entries
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, e)| e.last_failure)
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                warn!(
                    "All proxies demoted, falling back to {}",
                    pool.entries[index].url
                );
                index
            }
        };

        Some(pool.entries[index].url.clone())
    }

    /// Record a successful request through a proxy
    pub async fn report_success(&self, proxy: &str) {
        let mut pool = self.pool.lock().await;
        if let Some(entry) = pool.entries.iter_mut().find(|e| e.url == proxy) {
            entry.consecutive_failures = 0;
            entry.total_successes += 1;
        }
    }

    /// Record a connection failure through a proxy
    pub async fn report_failure(&self, proxy: &str) {
        let mut pool = self.pool.lock().await;
        let now = Instant::now();
        if let Some(entry) = pool.entries.iter_mut().find(|e| e.url == proxy) {
            entry.consecutive_failures += 1;
            entry.total_failures += 1;
            entry.last_failure = Some(now);
            if entry.consecutive_failures >= self.max_failures && entry.demoted_until.is_none() {
                warn!(
                    "Proxy {} demoted for {:?} after {} consecutive failures",
                    entry.url, self.cooldown, entry.consecutive_failures
                );
                entry.demoted_until = Some(now + self.cooldown);
            } else {
                debug!(
                    "Proxy {} failed ({} consecutive)",
                    entry.url, entry.consecutive_failures
                );
            }
        }
    }

    /// Counters for every proxy in the pool
    pub async fn stats(&self) -> Vec<ProxyStats> {
        let pool = self.pool.lock().await;
        let now = Instant::now();
        pool.entries
            .iter()
            .map(|e| ProxyStats {
                url: e.url.clone(),
                available: e.is_available(now),
                consecutive_failures: e.consecutive_failures,
                total_failures: e.total_failures,
                total_successes: e.total_successes,
            })
            .collect()
    }
}

#[async_trait]
impl Middleware for ProxyRotationMiddleware {
    fn name(&self) -> &str {
        "ProxyRotationMiddleware"
    }

    async fn before_request(&self, mut request: Request, _settings: &CrawlSettings) -> Result<Request> {
        if request.proxy.is_none() {
            request.proxy = self.select().await;
        }
        Ok(request)
    }

    async fn after_response(
        &self,
        response: FetchResult,
        request: &Request,
        _settings: &CrawlSettings,
    ) -> Result<FetchResult> {
        if let Some(proxy) = &request.proxy {
            self.report_success(proxy).await;
        }
        Ok(response)
    }

    async fn on_error(&self, request: &Request, error: &Error, _settings: &CrawlSettings) {
        let Some(proxy) = &request.proxy else {
            return;
        };
        if error.network_cause().map_or(false, |c| c.is_connection_failure()) {
            self.report_failure(proxy).await;
        }
    }
}
