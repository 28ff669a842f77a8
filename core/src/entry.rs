use std::sync::Arc;
use url::Url;

use crate::canonical::normalize_url;
use crate::error::Result;

/// A URL waiting in, or popped from, the frontier
#[derive(Debug, Clone)]
pub struct UrlEntry {
    /// Canonical form of the URL, used for deduplication
    pub url: Url,

    /// Number of link hops from the seed (seeds are depth 0)
    pub depth: usize,

    /// The page this URL was discovered on
    pub discovered_from: Option<Arc<UrlEntry>>,
}

impl UrlEntry {
    /// Create a seed entry
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            depth: 0,
            discovered_from: None,
        }
    }

    /// Parse and normalize a raw seed URL
    pub fn parse_seed(raw: &str) -> Result<Self> {
        Ok(Self::seed(normalize_url(raw)?))
    }

    /// Create an entry for a link found on `parent`
    pub fn child(parent: &Arc<UrlEntry>, url: Url) -> Self {
        Self {
            url,
            depth: parent.depth + 1,
            discovered_from: Some(Arc::clone(parent)),
        }
    }

    /// Create an entry at an explicit depth
    pub fn new(url: Url, depth: usize, discovered_from: Option<Arc<UrlEntry>>) -> Self {
        Self {
            url,
            depth,
            discovered_from,
        }
    }

    /// The canonical URL as a string key
    pub fn key(&self) -> &str {
        self.url.as_str()
    }

    /// The URL of the referring page, if any
    pub fn referrer(&self) -> Option<&Url> {
        self.discovered_from.as_ref().map(|p| &p.url)
    }
}

impl PartialEq for UrlEntry {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.depth == other.depth
    }
}

impl Eq for UrlEntry {}
