use std::sync::Arc;

use dashmap::DashMap;
use harvest_core::config::CrawlSettings;
use harvest_core::error::{Error, NetworkError, Result};
use harvest_core::request::{FetchMode, Request};
use harvest_core::response::FetchResult;
use harvest_middleware::MiddlewareChain;
use log::{debug, trace};
use tokio::sync::Mutex;
use tokio::time::timeout;
use url::Url;

use crate::cache::{CacheKey, CacheStats, ResponseCache};
use crate::http::{HttpTransport, HttpTransportConfig};
use crate::transport::Transport;

/// Fetches pages through the middleware chain, consulting the cache first.
///
/// The fetcher never retries; that is the caller's decision.
pub struct Fetcher {
    /// Transport for plain HTTP fetches
    http: Arc<dyn Transport>,

    /// Transport for browser fetches, if one is available
    browser: Option<Arc<dyn Transport>>,

    /// Response cache; `None` means every call goes to the network
    cache: Option<Arc<ResponseCache>>,

    /// Middleware wrapped around every network call
    middleware: MiddlewareChain,

    /// One lock per key being fetched, so concurrent misses coalesce
    in_flight: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl Fetcher {
    /// Create a fetcher with only an HTTP transport, no cache and no middleware
    pub fn new(http: Arc<dyn Transport>) -> Self {
        Self {
            http,
            browser: None,
            cache: None,
            middleware: MiddlewareChain::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Build the fetcher described by the settings
    pub fn from_settings(settings: &CrawlSettings) -> Result<Self> {
        let http = HttpTransport::new(HttpTransportConfig::from_settings(settings))?;
        let mut fetcher = Self::new(Arc::new(http))
            .with_middleware(MiddlewareChain::from_settings(settings));
        if settings.cache_enabled {
            fetcher = fetcher.with_cache(Arc::new(ResponseCache::from_settings(settings)));
        }
        Ok(fetcher)
    }

    /// Set the browser transport
    pub fn with_browser(mut self, browser: Arc<dyn Transport>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Set the response cache
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the middleware chain
    pub fn with_middleware(mut self, middleware: MiddlewareChain) -> Self {
        self.middleware = middleware;
        self
    }

    /// The middleware chain
    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// The response cache, if enabled
    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    /// Cache counters, if the cache is enabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Clear the response cache, its disk tier included
    pub async fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear_all().await;
        }
    }

    /// Fetch a URL.
    ///
    /// A live cache entry is returned with `from_cache` set, skipping the
    /// network and the middleware. Otherwise the request goes through the
    /// middleware chain and the transport, bounded by the configured timeout.
    pub async fn fetch(&self, url: &Url, mode: FetchMode, settings: &CrawlSettings) -> Result<FetchResult> {
        let Some(cache) = &self.cache else {
            return self.fetch_network(url, mode, settings).await;
        };

        let key = CacheKey::new(url, mode);
        if let Some(hit) = cache.lookup(&key).await {
            debug!("Cache hit for {}", url);
            return Ok(hit.cached_copy());
        }

        let lock = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(Default::default)
            .value()
            .clone();
        let guard = lock.lock().await;

        // Another task may have fetched it while we waited
        let outcome = match cache.lookup(&key).await {
            Some(hit) => {
                trace!("Coalesced fetch of {} served from cache", url);
                Ok(hit.cached_copy())
            }
            None => {
                let outcome = self.fetch_network(url, mode, settings).await;
                if let Ok(result) = &outcome {
                    cache.store(key.clone(), result).await;
                }
                outcome
            }
        };

        drop(guard);
        self.in_flight
            .remove_if(&key, |_, l| Arc::strong_count(l) <= 2);
        outcome
    }

    async fn fetch_network(&self, url: &Url, mode: FetchMode, settings: &CrawlSettings) -> Result<FetchResult> {
        let transport = match mode {
            FetchMode::Http => Arc::clone(&self.http),
            FetchMode::Browser => self.browser.clone().ok_or_else(|| {
                Error::config("browser fetching requires a browser transport (build with the `browser` feature)")
            })?,
        };

        let request = Request::new(url.clone(), mode).with_timeout(settings.timeout());
        let request = self.middleware.before_request(request, settings).await?;
        let limit = request.timeout.unwrap_or_else(|| settings.timeout());

        let response = match timeout(limit, transport.fetch(&request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                self.middleware.on_error(&request, &error, settings).await;
                return Err(error);
            }
            Err(_) => {
                let error = Error::fetch(url.as_str(), NetworkError::Timeout(limit));
                self.middleware.on_error(&request, &error, settings).await;
                return Err(error);
            }
        };

        let result = FetchResult::new(url.clone(), response.status, response.headers, response.body, mode)
            .with_proxy(request.proxy.clone());
        self.middleware.after_response(result, &request, settings).await
    }
}
