use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use harvest_core::config::CrawlSettings;
use harvest_core::request::FetchMode;
use harvest_core::response::FetchResult;
use log::{debug, trace, warn};
use tokio::time::Instant;
use url::Url;

use crate::disk::DiskCache;

/// Identifies a cached response: the normalized URL plus how it was fetched
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Normalized URL
    pub url: String,
    /// Transport used
    pub mode: FetchMode,
}

impl CacheKey {
    /// Create a cache key
    pub fn new(url: &Url, mode: FetchMode) -> Self {
        Self {
            url: url.as_str().to_string(),
            mode,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    result: Arc<FetchResult>,
    stored_at: Instant,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Number of stored entries (expired ones included until purged)
    pub entries: usize,
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing usable in memory
    pub misses: u64,
    /// Memory misses answered by the disk tier
    pub disk_hits: u64,
    /// Entry lifetime
    pub ttl: Option<Duration>,
    /// Entry bound
    pub max_entries: usize,
}

/// Response cache: a bounded memory tier, optionally backed by a disk tier.
///
/// Reads never block each other. Only successful responses are stored, and
/// never when the server sent `Cache-Control: no-store` or `no-cache`. When
/// the memory tier is full, its oldest entry is evicted. Disk hits are
/// promoted into memory.
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Option<Duration>,
    max_entries: usize,
    disk: Option<DiskCache>,
    hits: AtomicU64,
    misses: AtomicU64,
    disk_hits: AtomicU64,
}

impl ResponseCache {
    /// Create a cache; `ttl` of `None` keeps entries until cleared
    pub fn new(ttl: Option<Duration>, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            disk: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
        }
    }

    /// Create the cache described by the settings
    pub fn from_settings(settings: &CrawlSettings) -> Self {
        let cache = Self::new(settings.cache_ttl(), settings.cache_max_entries);
        match &settings.cache_dir {
            Some(dir) => cache.with_disk(DiskCache::new(dir, settings.cache_ttl())),
            None => cache,
        }
    }

    /// Back the memory tier with a disk tier
    pub fn with_disk(mut self, disk: DiskCache) -> Self {
        self.disk = Some(disk);
        self
    }

    /// The disk tier, if any
    pub fn disk(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }

    /// Look up a live entry in memory, then on disk
    pub async fn lookup(&self, key: &CacheKey) -> Option<Arc<FetchResult>> {
        if let Some(hit) = self.get(key) {
            return Some(hit);
        }
        let disk = self.disk.as_ref()?;
        let result = disk.load(key).await?;
        debug!("Disk cache hit for {}", key.url);
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
        self.insert(key.clone(), &result);
        Some(Arc::new(result))
    }

    /// Store a response in memory and on disk.
    ///
    /// Returns whether the memory tier accepted it.
    pub async fn store(&self, key: CacheKey, result: &FetchResult) -> bool {
        if !Self::is_cacheable(result) {
            debug!("Not caching {} (status {})", key.url, result.status);
            return false;
        }
        if let Some(disk) = &self.disk {
            disk.store(&key, result).await;
        }
        self.insert(key, result)
    }

    /// Look up a live entry
    pub fn get(&self, key: &CacheKey) -> Option<Arc<FetchResult>> {
        let now = Instant::now();
        let found = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(Arc::clone(&entry.result)),
            Some(_) => {
                trace!("Cache entry for {} expired", key.url);
                None
            }
            None => None,
        };

        match found {
            Some(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            None => {
                self.entries.remove_if(key, |_, e| e.is_expired(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Whether a response may be stored
    pub fn is_cacheable(result: &FetchResult) -> bool {
        if !result.is_success() {
            return false;
        }
        match result.header("cache-control") {
            Some(value) => {
                let value = value.to_ascii_lowercase();
                !(value.contains("no-store") || value.contains("no-cache"))
            }
            None => true,
        }
    }

    /// Store a response. A live entry already present for the key wins.
    ///
    /// Returns whether the response was stored.
    pub fn insert(&self, key: CacheKey, result: &FetchResult) -> bool {
        if !Self::is_cacheable(result) {
            debug!("Not caching {} (status {})", key.url, result.status);
            return false;
        }

        let now = Instant::now();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }

        let mut stored = result.clone();
        stored.from_cache = false;
        let entry = CacheEntry {
            result: Arc::new(stored),
            stored_at: now,
            expires_at: self.ttl.map(|ttl| now + ttl),
        };

        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(entry);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().stored_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            trace!("Evicting {} from cache", key.url);
            self.entries.remove(&key);
        }
    }

    /// Drop every entry from memory
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop every entry from both tiers
    pub async fn clear_all(&self) {
        self.clear();
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.clear().await {
                warn!("Could not clear {}: {}", disk.dir().display(), e);
            }
        }
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            ttl: self.ttl,
            max_entries: self.max_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn result(url: &str, status: u16, cache_control: Option<&str>) -> FetchResult {
        let mut headers = HashMap::new();
        if let Some(value) = cache_control {
            headers.insert("Cache-Control".to_string(), value.to_string());
        }
        FetchResult::new(
            Url::parse(url).unwrap(),
            status,
            headers,
            b"<html>cached</html>".to_vec(),
            FetchMode::Http,
        )
    }

    fn key(url: &str) -> CacheKey {
        CacheKey::new(&Url::parse(url).unwrap(), FetchMode::Http)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let cache = ResponseCache::new(None, 10);
        assert!(cache.insert(key("http://a.test/"), &result("http://a.test/", 200, None)));

        let hit = cache.get(&key("http://a.test/")).unwrap();
        assert_eq!(hit.body, b"<html>cached</html>");
        assert!(cache.get(&key("http://a.test/other")).is_none());

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_mode_is_part_of_key() {
        let cache = ResponseCache::new(None, 10);
        cache.insert(key("http://a.test/"), &result("http://a.test/", 200, None));

        let browser_key = CacheKey::new(&Url::parse("http://a.test/").unwrap(), FetchMode::Browser);
        assert!(cache.get(&browser_key).is_none());
    }

    #[tokio::test]
    async fn test_only_successful_cacheable_responses_stored() {
        let cache = ResponseCache::new(None, 10);
        assert!(!cache.insert(key("http://a.test/404"), &result("http://a.test/404", 404, None)));
        assert!(!cache.insert(
            key("http://a.test/ns"),
            &result("http://a.test/ns", 200, Some("private, no-store"))
        ));
        assert!(!cache.insert(
            key("http://a.test/nc"),
            &result("http://a.test/nc", 200, Some("No-Cache"))
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_first_writer_wins() {
        let cache = ResponseCache::new(None, 10);
        let mut first = result("http://a.test/", 200, None);
        first.body = b"first".to_vec();
        let mut second = result("http://a.test/", 200, None);
        second.body = b"second".to_vec();

        assert!(cache.insert(key("http://a.test/"), &first));
        assert!(!cache.insert(key("http://a.test/"), &second));
        assert_eq!(cache.get(&key("http://a.test/")).unwrap().body, b"first");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = ResponseCache::new(Some(Duration::from_secs(60)), 10);
        cache.insert(key("http://a.test/"), &result("http://a.test/", 200, None));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get(&key("http://a.test/")).is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.get(&key("http://a.test/")).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ResponseCache::new(Some(Duration::from_secs(10)), 10);
        cache.insert(key("http://a.test/1"), &result("http://a.test/1", 200, None));
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert(key("http://a.test/2"), &result("http://a.test/2", 200, None));
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("http://a.test/2")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evicts_oldest_when_full() {
        let cache = ResponseCache::new(None, 2);
        for i in 1..=3 {
            let url = format!("http://a.test/{}", i);
            cache.insert(key(&url), &result(&url, 200, None));
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("http://a.test/1")).is_none());
        assert!(cache.get(&key("http://a.test/3")).is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = ResponseCache::new(None, 10);
        cache.insert(key("http://a.test/"), &result("http://a.test/", 200, None));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_disk_tier_survives_a_new_cache() {
        let dir = tempfile::tempdir().unwrap();
        let first = ResponseCache::new(None, 10).with_disk(DiskCache::new(dir.path(), None));
        assert!(first.store(key("http://a.test/"), &result("http://a.test/", 200, None)).await);
        assert!(!first.store(key("http://a.test/404"), &result("http://a.test/404", 404, None)).await);

        let second = ResponseCache::new(None, 10).with_disk(DiskCache::new(dir.path(), None));
        let hit = second.lookup(&key("http://a.test/")).await.unwrap();
        assert_eq!(hit.body, b"<html>cached</html>");
        assert!(second.lookup(&key("http://a.test/404")).await.is_none());

        // Promoted into memory
        assert_eq!(second.len(), 1);
        let stats = second.stats();
        assert_eq!(stats.disk_hits, 1);
        assert!(second.lookup(&key("http://a.test/")).await.is_some());
        assert_eq!(second.stats().hits, 1);

        second.clear_all().await;
        assert!(second.is_empty());
        assert!(second.lookup(&key("http://a.test/")).await.is_none());
    }
}
