use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::request::FetchMode;

/// The outcome of a single successful fetch.
///
/// A 4xx/5xx status is still a `FetchResult`; only transport failures are errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    /// The URL of the response
    pub url: Url,

    /// The HTTP status code
    pub status: u16,

    /// Response headers, keys lowercased
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(skip)]
    pub body: Vec<u8>,

    /// Declared content type, if any
    pub content_type: Option<String>,

    /// Transport used
    pub mode: FetchMode,

    /// Proxy the request went through
    pub proxy: Option<String>,

    /// When the network call completed
    pub fetched_at: DateTime<Utc>,

    /// Whether this result was served from the response cache
    pub from_cache: bool,
}

impl FetchResult {
    /// Create a new fetch result
    pub fn new(
        url: Url,
        status: u16,
        headers: HashMap<String, String>,
        body: Vec<u8>,
        mode: FetchMode,
    ) -> Self {
        let headers: HashMap<String, String> = headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        let content_type = headers.get("content-type").cloned();
        Self {
            url,
            status,
            headers,
            body,
            content_type,
            mode,
            proxy: None,
            fetched_at: Utc::now(),
            from_cache: false,
        }
    }

    /// Record the proxy that served this result
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Copy of this result marked as coming from the cache
    pub fn cached_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.from_cache = true;
        copy
    }

    /// Get the response body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Get a header value by name, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Check if the response was successful (status code 200-299)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body can be treated as an HTML document.
    ///
    /// A missing content type is accepted; a declared non-HTML type is not.
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            None => true,
            Some(ct) => {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: u16, content_type: Option<&str>) -> FetchResult {
        let mut headers = HashMap::new();
        if let Some(ct) = content_type {
            headers.insert("Content-Type".to_string(), ct.to_string());
        }
        FetchResult::new(
            Url::parse("http://a.test/").unwrap(),
            status,
            headers,
            b"<html></html>".to_vec(),
            FetchMode::Http,
        )
    }

    #[test]
    fn test_headers_are_lowercased() {
        let res = result(200, Some("text/html; charset=utf-8"));
        assert_eq!(res.header("CONTENT-TYPE"), Some("text/html; charset=utf-8"));
        assert_eq!(res.content_type.as_deref(), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn test_is_success() {
        assert!(result(200, None).is_success());
        assert!(result(204, None).is_success());
        assert!(!result(404, None).is_success());
        assert!(!result(503, None).is_success());
    }

    #[test]
    fn test_is_html() {
        assert!(result(200, None).is_html());
        assert!(result(200, Some("text/html")).is_html());
        assert!(result(200, Some("application/xhtml+xml")).is_html());
        assert!(!result(200, Some("application/pdf")).is_html());
    }

    #[test]
    fn test_cached_copy() {
        let res = result(200, None);
        let copy = res.cached_copy();
        assert!(!res.from_cache);
        assert!(copy.from_cache);
        assert_eq!(copy.body, res.body);
        assert_eq!(copy.fetched_at, res.fetched_at);
    }
}
