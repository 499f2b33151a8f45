//! File-based TTL cache for fetched payloads
//!
//! Each logical key maps to one JSON file named by the SHA-256 of the key:
//!
//! ```text
//! <cache_dir>/<sha256-hex>.json
//! {"timestamp": "2024-05-01T12:00:00Z", "key": "debank_wallet_0x...", "data": ...}
//! ```
//!
//! Caching is advisory: every storage failure is logged and reported to the
//! caller as a miss, never as an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::CacheConfig;

/// One persisted cache entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Write time
    pub timestamp: DateTime<Utc>,
    /// Logical key, kept to detect hash collisions on read
    pub key: String,
    /// Cached payload
    pub data: serde_json::Value,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.timestamp).to_std() {
            Ok(age) => age > ttl,
            // Written "in the future" (clock skew): still fresh
            Err(_) => false,
        }
    }
}

/// TTL-bound cache keyed by arbitrary strings
#[derive(Clone, Debug)]
pub struct Cache {
    dir: PathBuf,
    ttl: Duration,
}

impl Cache {
    /// Create a cache rooted at `dir`; the directory is created on first write
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    /// Create a cache from configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.dir.clone(), config.ttl)
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Storage path for a key
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{digest:x}.json"))
    }

    /// Look up a fresh value
    ///
    /// Returns `None` when the entry is missing, expired (the file is then
    /// removed), belongs to a different key, or cannot be read or decoded.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.entry_path(key);

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Error reading cache entry");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "Corrupt cache entry, ignoring");
                return None;
            }
        };

        if entry.key != key {
            tracing::warn!(key, stored_key = %entry.key, "Cache hash collision, treating as miss");
            return None;
        }

        if entry.is_expired(self.ttl, Utc::now()) {
            tracing::debug!(key, "Cache entry expired");
            if let Err(e) = tokio::fs::remove_file(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(key, error = %e, "Failed to remove expired cache entry");
            }
            return None;
        }

        match serde_json::from_value(entry.data) {
            Ok(value) => {
                tracing::debug!(key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Cached payload has unexpected shape");
                None
            }
        }
    }

    /// Store a value, overwriting any existing entry
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = self.try_set(key, value).await {
            tracing::warn!(key, error = %e, "Error writing cache entry");
        }
    }

    async fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> crate::Result<()> {
        let entry = CacheEntry {
            timestamp: Utc::now(),
            key: key.to_string(),
            data: serde_json::to_value(value)?,
        };
        let bytes = serde_json::to_vec_pretty(&entry)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.entry_path(key);
        // Write beside the target and rename so readers never see a partial file
        let tmp = path.with_extension(format!("json.{}.tmp", rand::random::<u32>()));
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove an entry if present
    pub async fn remove(&self, key: &str) {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(key, error = %e, "Failed to remove cache entry"),
        }
    }

    /// Delete every expired or unreadable entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Cannot scan cache directory");
                return 0;
            }
        };

        let now = Utc::now();
        let mut removed = 0;
        while let Ok(Some(item)) = dir.next_entry().await {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stale = match tokio::fs::read(&path).await {
                Ok(raw) => serde_json::from_slice::<CacheEntry>(&raw)
                    .map(|entry| entry.is_expired(self.ttl, now))
                    .unwrap_or(true),
                Err(_) => false,
            };
            if stale && tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }

        tracing::info!(removed, dir = %self.dir.display(), "Purged stale cache entries");
        removed
    }
}
