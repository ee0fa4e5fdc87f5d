use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::{BoxError, Result};

/// Key/value store backing tokens, folder indexes and asset metadata
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get cached content by key; expired entries behave as absent
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store content without expiry
    async fn set(&self, key: &str, value: Bytes) -> Result<()>;

    /// Store content that expires after `ttl`
    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Check if a live entry exists for the key
    async fn contains(&self, key: &str) -> bool;

    /// Remove a key from the cache
    async fn remove(&self, key: &str) -> Result<()>;

    /// Clear all cached content
    async fn clear(&self) -> Result<()>;
}

/// Hex encoded SHA-256 of `input`, used to derive stable cache keys
pub fn hash_key(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Read raw bytes; a failing cache is logged and reported as a miss
pub(crate) async fn load_bytes(cache: &dyn Cache, key: &str) -> Option<Bytes> {
    match cache.get(key).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(key, error = %e, "Cache read failed, treating as miss");
            None
        }
    }
}

/// Store raw bytes; write failures are logged and ignored
pub(crate) async fn store_bytes(cache: &dyn Cache, key: &str, value: Bytes) {
    if let Err(e) = cache.set(key, value).await {
        error!(key, error = %e, "Could not store value in cache");
    }
}

/// Read and decode a JSON value; any failure is logged and reported as a miss
pub(crate) async fn load_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let raw = load_bytes(cache, key).await?;
    match serde_json::from_slice(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Discarding undecodable cache entry");
            None
        }
    }
}

/// Encode and store a JSON value; write failures are logged and ignored
pub(crate) async fn store_json<T: Serialize>(cache: &dyn Cache, key: &str, value: &T) {
    match serde_json::to_vec(value) {
        Ok(encoded) => store_bytes(cache, key, Bytes::from(encoded)).await,
        Err(e) => error!(key, error = %e, "Could not encode value for cache"),
    }
}

struct MemoryEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// In-memory cache implementation
pub struct MemoryCache {
    store: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        {
            let store = self.store.read().await;
            match store.get(key) {
                Some(entry) if entry.is_live() => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
                Some(_) => {}
            }
        }

        let mut store = self.store.write().await;
        if store.get(key).is_some_and(|entry| !entry.is_live()) {
            store.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let mut store = self.store.write().await;
        store.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let mut store = self.store.write().await;
        store.insert(
            key.to_string(),
            MemoryEntry {
                value,
                // A TTL past the clock's range never expires
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn contains(&self, key: &str) -> bool {
        let store = self.store.read().await;
        store.get(key).is_some_and(|entry| entry.is_live())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut store = self.store.write().await;
        store.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut store = self.store.write().await;
        store.clear();
        Ok(())
    }
}

/// Disk-based cache implementation
///
/// Each entry is a file whose first 8 bytes hold the expiry as big-endian
/// unix seconds (0 for none), followed by the payload.
pub struct DiskCache {
    root_dir: PathBuf,
}

const NO_EXPIRY: u64 = 0;

impl DiskCache {
    /// Create a new disk cache at the specified directory
    pub async fn new(root_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root_dir).await?;
        Ok(Self { root_dir })
    }

    /// Convert a cache key to a safe file path
    fn key_to_path(&self, key: &str) -> PathBuf {
        let hash_str = hash_key(key);
        self.root_dir.join(&hash_str[..2]).join(&hash_str[2..])
    }

    fn now_secs() -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }

    async fn write_entry(&self, key: &str, value: Bytes, expires_at: u64) -> Result<()> {
        let path = self.key_to_path(key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut buf = BytesMut::with_capacity(8 + value.len());
        buf.put_u64(expires_at);
        buf.put_slice(&value);

        fs::write(&path, &buf).await.map_err(|e| BoxError::Cache {
            message: format!("Failed to write to disk cache: {}", e),
        })
    }
}

#[async_trait]
impl Cache for DiskCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.key_to_path(key);

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BoxError::Cache {
                    message: format!("Failed to read from disk cache: {}", e),
                })
            }
        };

        if data.len() < 8 {
            return Err(BoxError::Cache {
                message: format!("Truncated disk cache entry for {}", key),
            });
        }

        let mut data = Bytes::from(data);
        let expires_at = data.get_u64();
        if expires_at != NO_EXPIRY && Self::now_secs() >= expires_at {
            self.remove(key).await?;
            return Ok(None);
        }
        Ok(Some(data))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        self.write_entry(key, value, NO_EXPIRY).await
    }

    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        // Round up so a sub-second TTL still lives until the next second
        let ttl_secs = ttl
            .as_secs()
            .saturating_add(u64::from(ttl.subsec_nanos() > 0));
        let expires_at = Self::now_secs().saturating_add(ttl_secs);
        self.write_entry(key, value, expires_at).await
    }

    async fn contains(&self, key: &str) -> bool {
        matches!(self.get(key).await, Ok(Some(_)))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_to_path(key);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BoxError::Cache {
                message: format!("Failed to remove from disk cache: {}", e),
            }),
        }
    }

    async fn clear(&self) -> Result<()> {
        // Remove the entire cache directory and recreate it
        fs::remove_dir_all(&self.root_dir).await?;
        fs::create_dir_all(&self.root_dir).await?;
        Ok(())
    }
}

/// No-op cache that doesn't cache anything
pub struct NoCache;

#[async_trait]
impl Cache for NoCache {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Bytes) -> Result<()> {
        Ok(())
    }

    async fn set_with_ttl(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn contains(&self, _key: &str) -> bool {
        false
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}
