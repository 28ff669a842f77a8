use std::sync::Arc;

use futures::future::join_all;
use harvest_core::async_trait;
use harvest_core::config::CrawlSettings;
use harvest_core::error::{Error, Result};
use harvest_core::request::Request;
use harvest_core::response::FetchResult;
use log::debug;

mod headers;
mod logger;
mod proxy;
mod rate_limit;

pub use headers::{DefaultHeadersMiddleware, UserAgentMiddleware};
pub use logger::{LogLevel, ResponseLoggerMiddleware};
pub use proxy::{ProxyRotationMiddleware, ProxyStats, ProxyStrategy};
pub use rate_limit::RateLimitMiddleware;

/// A hook around every network fetch
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Get the name of this middleware
    fn name(&self) -> &str;

    /// Rewrite a request before it is sent
    async fn before_request(&self, request: Request, settings: &CrawlSettings) -> Result<Request>;

    /// Inspect or rewrite a response after it is received
    async fn after_response(
        &self,
        response: FetchResult,
        _request: &Request,
        _settings: &CrawlSettings,
    ) -> Result<FetchResult> {
        Ok(response)
    }

    /// Observe a failed fetch
    async fn on_error(&self, _request: &Request, _error: &Error, _settings: &CrawlSettings) {}

    /// Called once when a crawl starts
    async fn opened(&self, _settings: &CrawlSettings) -> Result<()> {
        Ok(())
    }

    /// Called once when a crawl ends
    async fn closed(&self, _settings: &CrawlSettings) -> Result<()> {
        Ok(())
    }
}

/// An ordered list of middleware applied onion-style.
///
/// `before_request` runs in registration order; `after_response` and
/// `on_error` run in reverse.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    /// The middlewares, in registration order
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the standard chain for a crawl.
    ///
    /// Order: default headers, user agent, proxy rotation (if proxies are
    /// configured), response logging (if enabled), rate limiting. The rate
    /// limiter sits innermost so its delay is measured right before the send.
    pub fn from_settings(settings: &CrawlSettings) -> Self {
        let mut chain = Self::new();
        chain.add(DefaultHeadersMiddleware::common().with_headers(settings.headers.clone()));
        chain.add(UserAgentMiddleware::from_settings(settings));
        if !settings.proxies.is_empty() {
            chain.add(ProxyRotationMiddleware::from_settings(settings));
        }
        if settings.log_requests {
            chain.add(ResponseLoggerMiddleware::info());
        }
        chain.add(RateLimitMiddleware::new());
        chain
    }

    /// Add a middleware to the end of the chain
    pub fn add<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Add a shared middleware to the end of the chain
    pub fn add_shared(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Builder form of [`add`](Self::add)
    pub fn with<M: Middleware>(mut self, middleware: M) -> Self {
        self.add(middleware);
        self
    }

    /// Names of the middlewares, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// Number of middlewares in the chain
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run every `before_request` hook in registration order
    pub async fn before_request(
        &self,
        mut request: Request,
        settings: &CrawlSettings,
    ) -> Result<Request> {
        for middleware in &self.middlewares {
            request = middleware.before_request(request, settings).await?;
        }
        Ok(request)
    }

    /// Run every `after_response` hook in reverse order
    pub async fn after_response(
        &self,
        mut response: FetchResult,
        request: &Request,
        settings: &CrawlSettings,
    ) -> Result<FetchResult> {
        for middleware in self.middlewares.iter().rev() {
            response = middleware.after_response(response, request, settings).await?;
        }
        Ok(response)
    }

    /// Run every `on_error` hook in reverse order
    pub async fn on_error(&self, request: &Request, error: &Error, settings: &CrawlSettings) {
        for middleware in self.middlewares.iter().rev() {
            middleware.on_error(request, error, settings).await;
        }
    }

    /// Notify every middleware that a crawl started
    pub async fn opened(&self, settings: &CrawlSettings) -> Result<()> {
        debug!("Middleware order: {}", self.names().join(", "));
        let results = join_all(self.middlewares.iter().map(|m| m.opened(settings))).await;
        results.into_iter().collect()
    }

    /// Notify every middleware that a crawl ended
    pub async fn closed(&self, settings: &CrawlSettings) -> Result<()> {
        let results = join_all(self.middlewares.iter().map(|m| m.closed(settings))).await;
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests;
