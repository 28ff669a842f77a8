use std::sync::Arc;

use harvest_core::async_trait;
use harvest_core::canonical::normalize_url;
use harvest_core::entry::UrlEntry;
use harvest_core::error::Result;

/// Queue of URLs to crawl plus the set of URLs already seen.
///
/// Implementations guarantee that the visited check, the visited insert and
/// the queue update happen atomically, and that no URL is yielded twice.
#[async_trait]
pub trait Frontier: Send + Sync + 'static {
    /// Add an entry. Returns `false` if it was already seen, exceeds the depth
    /// bound, or is rejected by the URL filter.
    async fn push(&self, entry: UrlEntry) -> bool;

    /// Get the next entry to crawl.
    ///
    /// Fails with `FrontierCorruption` if an entry would be yielded twice.
    async fn pop(&self) -> Result<Option<UrlEntry>>;

    /// Check if the frontier has nothing left to yield
    async fn is_empty(&self) -> bool;

    /// Get the number of pending entries
    async fn len(&self) -> usize;

    /// Check if a normalized URL has been enqueued before
    async fn has_seen(&self, url: &str) -> bool;

    /// Clear all pending entries and seen URLs
    async fn clear(&self);

    /// Normalize a raw URL and push it.
    ///
    /// Malformed input fails with `InvalidUrl`; the caller decides whether
    /// that is worth more than a log line.
    async fn push_url(
        &self,
        raw: &str,
        depth: usize,
        discovered_from: Option<Arc<UrlEntry>>,
    ) -> Result<bool> {
        let url = normalize_url(raw)?;
        Ok(self.push(UrlEntry::new(url, depth, discovered_from)).await)
    }
}
