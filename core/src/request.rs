use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::canonical::normalize_url;
use crate::error::Result;

/// How a page is retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Plain HTTP request
    #[default]
    Http,
    /// Headless browser navigation
    Browser,
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchMode::Http => write!(f, "http"),
            FetchMode::Browser => write!(f, "browser"),
        }
    }
}

/// An outgoing fetch, as seen and rewritten by the middleware chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// The URL to request
    pub url: Url,

    /// Transport to use
    #[serde(default)]
    pub mode: FetchMode,

    /// HTTP headers to include
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Proxy URL to use for this request
    #[serde(default)]
    pub proxy: Option<String>,

    /// Timeout for this request
    #[serde(default)]
    pub timeout: Option<Duration>,

    /// Metadata for middleware processing
    #[serde(default)]
    pub meta: HashMap<String, serde_json::Value>,
}

impl Request {
    /// Create a request for an already normalized URL
    pub fn new(url: Url, mode: FetchMode) -> Self {
        Self {
            url,
            mode,
            headers: HashMap::new(),
            proxy: None,
            timeout: None,
            meta: HashMap::new(),
        }
    }

    /// Create a new HTTP request from a raw URL string
    pub fn get<U: AsRef<str>>(url: U) -> Result<Self> {
        let url = normalize_url(url.as_ref())?;
        Ok(Self::new(url, FetchMode::Http))
    }

    /// Add a header to the request
    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add metadata to the request
    pub fn with_meta<K: Into<String>, V: Into<serde_json::Value>>(
        mut self,
        key: K,
        value: V,
    ) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Set the timeout for this request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the proxy for this request
    pub fn with_proxy<P: Into<String>>(mut self, proxy: P) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Look up a header, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether a header is present, ignoring case
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }
}
