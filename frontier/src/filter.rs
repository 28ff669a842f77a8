use harvest_core::config::CrawlSettings;
use harvest_core::error::{Error, Result};
use log::debug;
use regex::Regex;
use url::Url;

/// Decides which discovered URLs are worth crawling
#[derive(Debug, Clone, Default)]
pub struct UrlFilter {
    /// Hosts that may be crawled; subdomains included. Empty allows all.
    allowed_domains: Vec<String>,

    /// At least one must match, if any are given
    include_patterns: Vec<Regex>,

    /// None may match
    exclude_patterns: Vec<Regex>,
}

impl UrlFilter {
    /// Create a filter that accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a filter from string patterns
    pub fn from_strings(
        allowed_domains: &[String],
        include_patterns: &[String],
        exclude_patterns: &[String],
    ) -> Result<Self> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p)
                        .map_err(|e| Error::config(format!("Invalid URL pattern '{}': {}", p, e)))
                })
                .collect::<Result<Vec<_>>>()
        };

        Ok(Self {
            allowed_domains: allowed_domains
                .iter()
                .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            include_patterns: compile(include_patterns)?,
            exclude_patterns: compile(exclude_patterns)?,
        })
    }

    /// Build the filter described by the crawl settings
    pub fn from_settings(settings: &CrawlSettings) -> Result<Self> {
        Self::from_strings(
            &settings.allowed_domains,
            &settings.include_patterns,
            &settings.exclude_patterns,
        )
    }

    /// Restrict crawling to a domain
    pub fn with_allowed_domain(mut self, domain: impl Into<String>) -> Self {
        self.allowed_domains.push(domain.into().to_ascii_lowercase());
        self
    }

    /// Check whether a URL passes the filter
    pub fn allows(&self, url: &Url) -> bool {
        let url_str = url.as_str();

        // Check exclude patterns first
        if let Some(pattern) = self.exclude_patterns.iter().find(|p| p.is_match(url_str)) {
            debug!("URL {} matched exclude pattern {}", url_str, pattern);
            return false;
        }

        if !self.include_patterns.is_empty()
            && !self.include_patterns.iter().any(|p| p.is_match(url_str))
        {
            debug!("URL {} did not match any include pattern", url_str);
            return false;
        }

        if !self.allowed_domains.is_empty() {
            let host = url.host_str().unwrap_or_default();
            let allowed = self
                .allowed_domains
                .iter()
                .any(|d| host == d || host.ends_with(&format!(".{}", d)));
            if !allowed {
                debug!("URL {} is outside the allowed domains", url_str);
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_empty_filter_allows_everything() {
        assert!(UrlFilter::new().allows(&url("http://anything.test/x")));
    }

    #[test]
    fn test_allowed_domains_include_subdomains() {
        let filter = UrlFilter::new().with_allowed_domain("a.test");
        assert!(filter.allows(&url("http://a.test/1")));
        assert!(filter.allows(&url("http://www.a.test/1")));
        assert!(!filter.allows(&url("http://b.test/1")));
        assert!(!filter.allows(&url("http://nota.test/1")));
    }

    #[test]
    fn test_include_and_exclude_patterns() {
        let filter = UrlFilter::from_strings(
            &[],
            &["/products?/".to_string()],
            &[r"\.pdf$".to_string()],
        )
        .unwrap();
        assert!(filter.allows(&url("http://shop.test/products/1")));
        assert!(!filter.allows(&url("http://shop.test/about")));
        assert!(!filter.allows(&url("http://shop.test/product/manual.pdf")));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = UrlFilter::from_strings(&[], &["(".to_string()], &[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
