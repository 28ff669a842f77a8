use std::collections::HashMap;

use harvest_core::async_trait;
use harvest_core::config::CrawlSettings;
use harvest_core::error::Result;
use harvest_core::request::Request;
use rand::seq::SliceRandom;

use crate::Middleware;

/// A middleware that adds default headers to requests.
///
/// Headers already present on the request are left alone.
pub struct DefaultHeadersMiddleware {
    /// Headers to add to requests
    headers: HashMap<String, String>,
}

impl DefaultHeadersMiddleware {
    /// Create a new DefaultHeadersMiddleware with the given headers
    pub fn new(headers: HashMap<String, String>) -> Self {
        Self { headers }
    }

    /// Create a new DefaultHeadersMiddleware with browser-like headers
    pub fn common() -> Self {
        Self::new(HashMap::new())
            .with_header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            )
            .with_header("Accept-Language", "en-US,en;q=0.5")
    }

    /// Add a header to the middleware
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add several headers, replacing defaults of the same name
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        for (key, value) in headers {
            self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&key));
            self.headers.insert(key, value);
        }
        self
    }
}

#[async_trait]
impl Middleware for DefaultHeadersMiddleware {
    fn name(&self) -> &str {
        "DefaultHeadersMiddleware"
    }

    async fn before_request(&self, mut request: Request, _settings: &CrawlSettings) -> Result<Request> {
        for (key, value) in &self.headers {
            if !request.has_header(key) {
                request.headers.insert(key.clone(), value.clone());
            }
        }
        Ok(request)
    }
}

/// A middleware that sets the User-Agent header, rotating through a pool
pub struct UserAgentMiddleware {
    /// Candidate user agents; one is picked at random per request
    user_agents: Vec<String>,
}

impl UserAgentMiddleware {
    /// Always send the same user agent
    pub fn fixed(user_agent: impl Into<String>) -> Self {
        Self {
            user_agents: vec![user_agent.into()],
        }
    }

    /// Rotate through a pool of user agents
    pub fn rotating(user_agents: Vec<String>) -> Self {
        Self { user_agents }
    }

    /// Use the rotation pool from the settings, or the single user agent
    pub fn from_settings(settings: &CrawlSettings) -> Self {
        if settings.user_agents.is_empty() {
            Self::fixed(settings.user_agent.clone())
        } else {
            Self::rotating(settings.user_agents.clone())
        }
    }

    fn pick(&self) -> Option<String> {
        self.user_agents.choose(&mut rand::thread_rng()).cloned()
    }
}

#[async_trait]
impl Middleware for UserAgentMiddleware {
    fn name(&self) -> &str {
        "UserAgentMiddleware"
    }

    async fn before_request(&self, mut request: Request, _settings: &CrawlSettings) -> Result<Request> {
        if !request.has_header("User-Agent") {
            if let Some(user_agent) = self.pick() {
                request.headers.insert("User-Agent".to_string(), user_agent);
            }
        }
        Ok(request)
    }
}
