//! URL canonicalization so that equivalent spellings of a page dedupe to one entry.

use url::Url;

use crate::error::{Error, Result};

/// Parse and normalize a URL string.
///
/// Normalization steps:
///
/// 1. Parse; only absolute `http`/`https` URLs with a host are accepted
/// 2. Lowercase scheme and host, drop default ports (done by the parser)
/// 3. Strip trailing slashes from non-root paths; empty path becomes `/`
/// 4. Remove the fragment
/// 5. Sort query parameters; drop an empty query
pub fn normalize_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| Error::invalid_url(trimmed, e.to_string()))?;
    normalize(url)
}

/// Normalize an already parsed URL.
pub fn normalize(mut url: Url) -> Result<Url> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(Error::invalid_url(
            url.as_str(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::invalid_url(url.as_str(), "missing host"));
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed }.to_string();
        url.set_path(&trimmed);
    } else if path.is_empty() {
        url.set_path("/");
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            pairs.sort();
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }

    Ok(url)
}

/// Resolve an href found on `base` into a normalized absolute URL.
///
/// Returns `None` for hrefs that do not point at a crawlable page
/// (`javascript:`, `mailto:`, `tel:`, fragment-only, non-http schemes).
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|p| lower.starts_with(p))
    {
        return None;
    }
    let joined = base.join(href).ok()?;
    normalize(joined).ok()
}

/// Key identifying the host a URL belongs to, including a non-default port.
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}
