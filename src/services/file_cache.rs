//! File-based cache for persistent storage.
//!
//! Keeps a disk copy of fetched candles so evaluation can continue on
//! slightly old data when every provider is down.

use crate::error::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File cache entry with the time it was stored (unix ms).
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    data: T,
    timestamp: i64,
}

/// File-based cache service. Timestamps come from the caller's clock.
#[derive(Debug, Clone)]
pub struct FileCache {
    cache_dir: PathBuf,
}

impl FileCache {
    /// Create a file cache rooted at `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            if let Err(e) = fs::create_dir_all(&cache_dir) {
                warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
            }
        }
        Self { cache_dir }
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the cache file path for a key.
    fn get_path(&self, key: &str) -> PathBuf {
        // Sanitize key for filesystem
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.cache_dir.join(format!("{}.json", safe_key))
    }

    fn read_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let content = fs::read_to_string(self.get_path(key)).ok()?;
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Failed to parse cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Get data and its stored time if it is no older than `max_age`.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Option<(T, DateTime<Utc>)> {
        let entry: CacheEntry<T> = self.read_entry(key)?;
        let stored_at = Utc.timestamp_millis_opt(entry.timestamp).single()?;

        if now - stored_at > max_age {
            debug!("Cache entry {} expired", key);
            return None;
        }

        Some((entry.data, stored_at))
    }

    /// Store data, writing to a temp file first so readers never see a torn file.
    pub fn set<T: Serialize>(&self, key: &str, data: &T, stored_at: DateTime<Utc>) -> Result<()> {
        let path = self.get_path(key);
        let tmp = path.with_extension("json.tmp");

        let entry = CacheEntry {
            data,
            timestamp: stored_at.timestamp_millis(),
        };
        let content = serde_json::to_string(&entry)?;

        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        debug!("Cached {} to disk", key);
        Ok(())
    }

    /// Remove a cache entry.
    pub fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.get_path(key));
    }

    /// Delete entries stored more than `max_age` before `now`. Returns how many went.
    pub fn cleanup(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let Ok(entries) = fs::read_dir(&self.cache_dir) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let expired = match serde_json::from_str::<CacheEntry<serde::de::IgnoredAny>>(&content)
            {
                Ok(e) => Utc
                    .timestamp_millis_opt(e.timestamp)
                    .single()
                    .map_or(true, |stored_at| now - stored_at > max_age),
                Err(_) => true,
            };
            if expired && fs::remove_file(&path).is_ok() {
                debug!("Removed old cache file: {:?}", path);
                removed += 1;
            }
        }
        removed
    }
}
