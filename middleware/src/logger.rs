use harvest_core::async_trait;
use harvest_core::config::CrawlSettings;
use harvest_core::error::{Error, Result};
use harvest_core::request::Request;
use harvest_core::response::FetchResult;
use log::{debug, info, warn};

use crate::Middleware;

/// Log level for the response logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
}

/// A middleware that logs responses and failed fetches
pub struct ResponseLoggerMiddleware {
    /// Log level to use
    level: LogLevel,
}

impl ResponseLoggerMiddleware {
    /// Create a new ResponseLoggerMiddleware with the given log level
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    /// Create a new ResponseLoggerMiddleware with INFO level
    pub fn info() -> Self {
        Self::new(LogLevel::Info)
    }

    /// Create a new ResponseLoggerMiddleware with DEBUG level
    pub fn debug() -> Self {
        Self::new(LogLevel::Debug)
    }
}

#[async_trait]
impl Middleware for ResponseLoggerMiddleware {
    fn name(&self) -> &str {
        "ResponseLoggerMiddleware"
    }

    async fn before_request(&self, request: Request, _settings: &CrawlSettings) -> Result<Request> {
        debug!("Request: {} via {}", request.url, request.mode);
        Ok(request)
    }

    async fn after_response(
        &self,
        response: FetchResult,
        _request: &Request,
        _settings: &CrawlSettings,
    ) -> Result<FetchResult> {
        let size = response.body.len();
        match self.level {
            LogLevel::Debug => debug!("Response: {} ({}, {} bytes)", response.url, response.status, size),
            LogLevel::Info => info!("Response: {} ({}, {} bytes)", response.url, response.status, size),
            LogLevel::Warn => warn!("Response: {} ({}, {} bytes)", response.url, response.status, size),
        }
        Ok(response)
    }

    async fn on_error(&self, request: &Request, error: &Error, _settings: &CrawlSettings) {
        warn!("Request to {} failed: {}", request.url, error);
    }
}
