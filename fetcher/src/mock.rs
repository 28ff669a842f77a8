use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use harvest_core::async_trait;
use harvest_core::canonical::normalize_url;
use harvest_core::error::{Error, NetworkError, Result};
use harvest_core::request::Request;
use tokio::time::sleep;

use crate::transport::{Transport, TransportResponse};

/// What the static transport does for one URL
#[derive(Debug, Clone)]
enum Scripted {
    /// Fail with this error
    Fail(NetworkError),
    /// Never answer
    Hang,
}

/// An in-memory transport serving canned pages.
///
/// Unknown URLs answer 404. Counts every call so tests can assert on how
/// many network fetches happened.
pub struct StaticTransport {
    /// Responses keyed by normalized URL
    pages: DashMap<String, TransportResponse>,

    /// Behaviour overriding the page, consumed one per call
    scripts: DashMap<String, VecDeque<Scripted>>,

    /// Calls per URL
    calls: DashMap<String, usize>,

    /// Calls in total
    total_calls: AtomicUsize,

    /// Simulated network latency
    latency: Option<Duration>,
}

fn key(url: &str) -> String {
    normalize_url(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl StaticTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self {
            pages: DashMap::new(),
            scripts: DashMap::new(),
            calls: DashMap::new(),
            total_calls: AtomicUsize::new(0),
            latency: None,
        }
    }

    /// Serve an HTML page with status 200
    pub fn with_page(self, url: &str, html: impl Into<String>) -> Self {
        self.with_response(url, 200, "text/html; charset=utf-8", html.into().into_bytes())
    }

    /// Serve an arbitrary response
    pub fn with_response(self, url: &str, status: u16, content_type: &str, body: Vec<u8>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        self.pages
            .insert(key(url), TransportResponse::new(status, headers, body));
        self
    }

    /// Fail the next `times` calls for a URL with `error`
    pub fn with_failures(self, url: &str, times: usize, error: NetworkError) -> Self {
        self.scripts
            .entry(key(url))
            .or_default()
            .extend(std::iter::repeat(Scripted::Fail(error)).take(times));
        self
    }

    /// Never answer the next `times` calls for a URL
    pub fn with_hangs(self, url: &str, times: usize) -> Self {
        self.scripts
            .entry(key(url))
            .or_default()
            .extend(std::iter::repeat(Scripted::Hang).take(times));
        self
    }

    /// Delay every answer
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls made for a URL
    pub fn calls(&self, url: &str) -> usize {
        self.calls.get(&key(url)).map(|c| *c).unwrap_or(0)
    }

    /// Number of calls made in total
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StaticTransport {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, request: &Request) -> Result<TransportResponse> {
        let url = request.url.to_string();
        *self.calls.entry(url.clone()).or_insert(0) += 1;
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            sleep(latency).await;
        }

        let scripted = self
            .scripts
            .get_mut(&url)
            .and_then(|mut queue| queue.pop_front());
        match scripted {
            Some(Scripted::Fail(error)) => return Err(Error::fetch(url, error)),
            Some(Scripted::Hang) => {
                futures::future::pending::<()>().await;
            }
            None => {}
        }

        match self.pages.get(&url) {
            Some(page) => Ok(page.clone()),
            None => {
                let mut headers = HashMap::new();
                headers.insert("Content-Type".to_string(), "text/html".to_string());
                Ok(TransportResponse::new(404, headers, b"Not Found".to_vec()))
            }
        }
    }
}
