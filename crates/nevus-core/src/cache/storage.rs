//! Cache storage layers

use super::types::{CacheEntry, CacheKey, StorageStatistics};
use crate::error::{NevusError, NevusResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Cache storage interface
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Get a cache entry
    async fn get(&self, key: &CacheKey) -> NevusResult<Option<CacheEntry>>;

    /// Set a cache entry
    async fn set(&self, key: CacheKey, entry: CacheEntry) -> NevusResult<()>;

    /// Remove a cache entry
    async fn remove(&self, key: &CacheKey) -> NevusResult<()>;

    /// Clear all entries
    async fn clear(&self) -> NevusResult<()>;

    /// Get storage statistics
    async fn statistics(&self) -> NevusResult<StorageStatistics>;

    /// Cleanup expired entries
    async fn cleanup_expired(&self) -> NevusResult<()>;
}

struct MemoryInner {
    cache: LruCache<u64, CacheEntry>,
    stats: StorageStatistics,
}

/// In-memory cache storage backed by an LRU map
pub struct MemoryStorage {
    inner: Mutex<MemoryInner>,
}

impl MemoryStorage {
    /// Create a new memory storage with the given entry capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            inner: Mutex::new(MemoryInner {
                cache: LruCache::new(capacity),
                stats: StorageStatistics::default(),
            }),
        }
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn get(&self, key: &CacheKey) -> NevusResult<Option<CacheEntry>> {
        let mut inner = self.inner.lock().await;

        let live = match inner.cache.get_mut(&key.hash) {
            Some(entry) if !entry.is_expired() => {
                entry.mark_accessed();
                Some(entry.clone())
            }
            Some(_) => None,
            None => {
                inner.stats.misses += 1;
                return Ok(None);
            }
        };

        match live {
            Some(entry) => {
                inner.stats.hits += 1;
                Ok(Some(entry))
            }
            None => {
                if let Some(old) = inner.cache.pop(&key.hash) {
                    inner.stats.size_bytes =
                        inner.stats.size_bytes.saturating_sub(old.size_bytes as u64);
                    inner.stats.evictions += 1;
                }
                inner.stats.entry_count = inner.cache.len();
                inner.stats.misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: CacheKey, entry: CacheEntry) -> NevusResult<()> {
        let mut inner = self.inner.lock().await;

        let at_capacity =
            inner.cache.len() >= inner.cache.cap().get() && !inner.cache.contains(&key.hash);
        let size = entry.size_bytes as u64;

        if let Some(old) = inner.cache.put(key.hash, entry) {
            inner.stats.size_bytes = inner.stats.size_bytes.saturating_sub(old.size_bytes as u64);
        } else if at_capacity {
            // LRU evicted the least recently used entry to make room
            inner.stats.evictions += 1;
        }

        inner.stats.size_bytes += size;
        inner.stats.entry_count = inner.cache.len();
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> NevusResult<()> {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.cache.pop(&key.hash) {
            inner.stats.size_bytes = inner.stats.size_bytes.saturating_sub(entry.size_bytes as u64);
            inner.stats.evictions += 1;
        }
        inner.stats.entry_count = inner.cache.len();
        Ok(())
    }

    async fn clear(&self) -> NevusResult<()> {
        let mut inner = self.inner.lock().await;
        inner.cache.clear();
        inner.stats = StorageStatistics::default();
        Ok(())
    }

    async fn statistics(&self) -> NevusResult<StorageStatistics> {
        Ok(self.inner.lock().await.stats.clone())
    }

    async fn cleanup_expired(&self) -> NevusResult<()> {
        let mut inner = self.inner.lock().await;
        let expired: Vec<u64> = inner
            .cache
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(hash, _)| *hash)
            .collect();

        for hash in expired {
            if let Some(entry) = inner.cache.pop(&hash) {
                inner.stats.size_bytes =
                    inner.stats.size_bytes.saturating_sub(entry.size_bytes as u64);
                inner.stats.evictions += 1;
            }
        }
        inner.stats.entry_count = inner.cache.len();
        Ok(())
    }
}

#[derive(Clone)]
struct IndexEntry {
    path: PathBuf,
    created_at: DateTime<Utc>,
    size: u64,
}

struct DiskInner {
    index: HashMap<u64, IndexEntry>,
    current_size: u64,
    stats: StorageStatistics,
}

/// Persistent cache storage, one JSON file per entry
pub struct DiskStorage {
    base_dir: PathBuf,
    capacity: u64,
    inner: Mutex<DiskInner>,
}

impl DiskStorage {
    /// Create a new disk storage rooted at `base_dir`
    pub fn new(base_dir: impl AsRef<Path>, capacity: u64) -> NevusResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        if !base_dir.exists() {
            std::fs::create_dir_all(&base_dir)
                .map_err(|e| NevusError::cache(format!("failed to create cache directory: {}", e)))?;
        }

        Ok(Self {
            base_dir,
            capacity,
            inner: Mutex::new(DiskInner {
                index: HashMap::new(),
                current_size: 0,
                stats: StorageStatistics::default(),
            }),
        })
    }

    /// Rebuild the index by scanning existing files
    pub async fn initialize(&self) -> NevusResult<()> {
        let mut inner = self.inner.lock().await;
        inner.index.clear();
        inner.current_size = 0;

        let mut namespaces = match fs::read_dir(&self.base_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(NevusError::cache(format!("failed to read cache dir: {}", e))),
        };

        while let Some(ns_entry) = namespaces
            .next_entry()
            .await
            .map_err(|e| NevusError::cache(e.to_string()))?
        {
            if !ns_entry
                .file_type()
                .await
                .map_err(|e| NevusError::cache(e.to_string()))?
                .is_dir()
            {
                continue;
            }
            let mut files = fs::read_dir(ns_entry.path())
                .await
                .map_err(|e| NevusError::cache(e.to_string()))?;
            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| NevusError::cache(e.to_string()))?
            {
                let path = file.path();
                let Some(hash) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u64>().ok())
                else {
                    continue;
                };
                let Ok(metadata) = file.metadata().await else {
                    continue;
                };
                let created_at = metadata
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                inner.current_size += metadata.len();
                inner.index.insert(
                    hash,
                    IndexEntry {
                        path,
                        created_at,
                        size: metadata.len(),
                    },
                );
            }
        }

        inner.stats.entry_count = inner.index.len();
        inner.stats.size_bytes = inner.current_size;
        Ok(())
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.base_dir
            .join(&key.namespace)
            .join(format!("{}.json", key.hash))
    }

    async fn remove_by_hash(&self, hash: u64) -> NevusResult<()> {
        let path = {
            let mut inner = self.inner.lock().await;
            let Some(entry) = inner.index.remove(&hash) else {
                return Ok(());
            };
            inner.current_size = inner.current_size.saturating_sub(entry.size);
            inner.stats.size_bytes = inner.current_size;
            inner.stats.entry_count = inner.index.len();
            inner.stats.evictions += 1;
            entry.path
        };
        let _ = fs::remove_file(path).await;
        Ok(())
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn get(&self, key: &CacheKey) -> NevusResult<Option<CacheEntry>> {
        let path = {
            let mut inner = self.inner.lock().await;
            match inner.index.get(&key.hash) {
                Some(entry) => entry.path.clone(),
                None => {
                    inner.stats.misses += 1;
                    return Ok(None);
                }
            }
        };

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(_) => {
                self.remove_by_hash(key.hash).await?;
                self.inner.lock().await.stats.misses += 1;
                return Ok(None);
            }
        };

        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) if !entry.is_expired() => {
                let mut inner = self.inner.lock().await;
                inner.stats.hits += 1;
                Ok(Some(entry))
            }
            Ok(_) => {
                // Expired on disk
                self.remove_by_hash(key.hash).await?;
                self.inner.lock().await.stats.misses += 1;
                Ok(None)
            }
            Err(e) => {
                debug!("dropping corrupted cache file {}: {}", path.display(), e);
                self.remove_by_hash(key.hash).await?;
                self.inner.lock().await.stats.misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: CacheKey, entry: CacheEntry) -> NevusResult<()> {
        let path = self.entry_path(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| NevusError::cache(format!("failed to create namespace dir: {}", e)))?;
        }

        let content = serde_json::to_string(&entry)
            .map_err(|e| NevusError::cache(format!("failed to serialize cache entry: {}", e)))?;
        fs::write(&path, &content)
            .await
            .map_err(|e| NevusError::cache(format!("failed to write cache file: {}", e)))?;

        let size = content.len() as u64;
        let evicted: Vec<PathBuf> = {
            let mut inner = self.inner.lock().await;
            if let Some(old) = inner.index.insert(
                key.hash,
                IndexEntry {
                    path,
                    created_at: entry.created_at,
                    size,
                },
            ) {
                inner.current_size = inner.current_size.saturating_sub(old.size);
            }
            inner.current_size += size;

            // Trim oldest entries until back under capacity
            let mut paths = Vec::new();
            while inner.current_size > self.capacity && inner.index.len() > 1 {
                let oldest = inner
                    .index
                    .iter()
                    .min_by_key(|(_, e)| e.created_at)
                    .map(|(hash, _)| *hash);
                let Some(hash) = oldest else { break };
                if let Some(victim) = inner.index.remove(&hash) {
                    inner.current_size = inner.current_size.saturating_sub(victim.size);
                    inner.stats.evictions += 1;
                    paths.push(victim.path);
                }
            }
            inner.stats.entry_count = inner.index.len();
            inner.stats.size_bytes = inner.current_size;
            paths
        };

        for path in evicted {
            let _ = fs::remove_file(path).await;
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> NevusResult<()> {
        self.remove_by_hash(key.hash).await
    }

    async fn clear(&self) -> NevusResult<()> {
        let paths: Vec<PathBuf> = {
            let mut inner = self.inner.lock().await;
            let paths = inner.index.values().map(|e| e.path.clone()).collect();
            inner.index.clear();
            inner.current_size = 0;
            inner.stats = StorageStatistics::default();
            paths
        };
        for path in paths {
            let _ = fs::remove_file(path).await;
        }
        Ok(())
    }

    async fn statistics(&self) -> NevusResult<StorageStatistics> {
        Ok(self.inner.lock().await.stats.clone())
    }

    async fn cleanup_expired(&self) -> NevusResult<()> {
        let candidates: Vec<(u64, PathBuf)> = {
            let inner = self.inner.lock().await;
            inner
                .index
                .iter()
                .map(|(hash, e)| (*hash, e.path.clone()))
                .collect()
        };

        for (hash, path) in candidates {
            let Ok(content) = fs::read_to_string(&path).await else {
                continue;
            };
            match serde_json::from_str::<CacheEntry>(&content) {
                Ok(entry) if entry.is_expired() => self.remove_by_hash(hash).await?,
                Ok(_) => {}
                Err(_) => self.remove_by_hash(hash).await?,
            }
        }
        Ok(())
    }
}
