use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use harvest_core::response::FetchResult;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::cache::CacheKey;

/// Metadata file written next to each cached body
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    url: String,
    stored_at: DateTime<Utc>,
    result: FetchResult,
}

/// Persistent cache tier: one metadata file and one body file per key.
///
/// Entries survive the process, so the lifetime is measured in wall-clock
/// time from when the entry was written. Unreadable entries are removed and
/// count as misses.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl DiskCache {
    /// Create a disk tier rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        Self { dir: dir.into(), ttl }
    }

    /// The cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_stem(key: &CacheKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.mode.to_string().as_bytes());
        hasher.update(b" ");
        hasher.update(key.url.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn paths(&self, key: &CacheKey) -> (PathBuf, PathBuf) {
        let stem = Self::file_stem(key);
        (
            self.dir.join(format!("{}.json", stem)),
            self.dir.join(format!("{}.body", stem)),
        )
    }

    fn is_expired(&self, stored_at: DateTime<Utc>) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        match (Utc::now() - stored_at).to_std() {
            Ok(age) => age >= ttl,
            // Written in the future; the clock moved back
            Err(_) => false,
        }
    }

    /// Load a live entry
    pub async fn load(&self, key: &CacheKey) -> Option<FetchResult> {
        let (meta_path, body_path) = self.paths(key);
        let meta = match fs::read(&meta_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read cache entry {}: {}", meta_path.display(), e);
                return None;
            }
        };

        let entry: StoredEntry = match serde_json::from_slice(&meta) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Dropping corrupt cache entry for {}: {}", key.url, e);
                self.remove(key).await;
                return None;
            }
        };

        if entry.url != key.url {
            // Hash collision
            debug!("Cache entry for {} belongs to {}", key.url, entry.url);
            return None;
        }

        if self.is_expired(entry.stored_at) {
            trace!("Disk cache entry for {} expired", key.url);
            self.remove(key).await;
            return None;
        }

        let body = match fs::read(&body_path).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Dropping cache entry for {} without a body: {}", key.url, e);
                self.remove(key).await;
                return None;
            }
        };

        let mut result = entry.result;
        result.body = body;
        result.from_cache = false;
        Some(result)
    }

    /// Write an entry, replacing any previous one. Returns whether it was written.
    pub async fn store(&self, key: &CacheKey, result: &FetchResult) -> bool {
        let (meta_path, body_path) = self.paths(key);
        let entry = StoredEntry {
            url: key.url.clone(),
            stored_at: Utc::now(),
            result: result.clone(),
        };
        let meta = match serde_json::to_vec(&entry) {
            Ok(meta) => meta,
            Err(e) => {
                warn!("Could not encode cache entry for {}: {}", key.url, e);
                return false;
            }
        };

        let written = async {
            fs::create_dir_all(&self.dir).await?;
            // The body goes first so a readable metadata file always has one
            fs::write(&body_path, &result.body).await?;
            let partial = meta_path.with_extension("json.tmp");
            fs::write(&partial, &meta).await?;
            fs::rename(&partial, &meta_path).await
        }
        .await;

        match written {
            Ok(()) => {
                trace!("Stored {} in {}", key.url, self.dir.display());
                true
            }
            Err(e) => {
                warn!("Could not write cache entry for {}: {}", key.url, e);
                false
            }
        }
    }

    /// Remove the entry for a key
    pub async fn remove(&self, key: &CacheKey) {
        let (meta_path, body_path) = self.paths(key);
        for path in [meta_path, body_path] {
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Could not remove {}: {}", path.display(), e);
                }
            }
        }
    }

    /// Remove every entry
    pub async fn clear(&self) -> std::io::Result<()> {
        match fs::remove_dir_all(&self.dir).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
