//! Record caching for the Nevus client
//!
//! A stale-tolerant read-through cache for domain records (risk analyses,
//! lesion records, profiles). Reads check the in-memory layer first, then
//! the persistent layer; entries expire by TTL and nothing stronger than
//! TTL expiry is guaranteed against the remote source of truth.

pub mod storage;
pub mod types;

#[cfg(test)]
mod tests;

pub use storage::{CacheStorage, DiskStorage, MemoryStorage};
pub use types::{CacheConfig, CacheEntry, CacheKey, CacheStatistics, StorageStatistics};

use crate::error::NevusResult;
use std::time::Duration;
use tracing::debug;

/// Cache manager coordinating the memory and persistent layers
pub struct CacheManager {
    memory: MemoryStorage,
    disk: Option<DiskStorage>,
    config: CacheConfig,
}

impl CacheManager {
    /// Create a new cache manager
    pub fn new(config: CacheConfig) -> NevusResult<Self> {
        let memory = MemoryStorage::new(config.memory_capacity);
        let disk = if config.enable_disk_cache {
            Some(DiskStorage::new(&config.disk_cache_dir, config.disk_capacity)?)
        } else {
            None
        };

        Ok(Self {
            memory,
            disk,
            config,
        })
    }

    /// Rebuild the persistent-layer index from disk
    pub async fn initialize(&self) -> NevusResult<()> {
        if let Some(disk) = &self.disk {
            disk.initialize().await?;
        }
        Ok(())
    }

    /// Get a value, checking memory first and promoting disk hits
    pub async fn get<T>(&self, key: &CacheKey) -> NevusResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        if self.config.enable_memory_cache {
            if let Some(entry) = self.memory.get(key).await? {
                if let Ok(value) = serde_json::from_value(entry.data) {
                    return Ok(Some(value));
                }
            }
        }

        if let Some(disk) = &self.disk {
            if let Some(entry) = disk.get(key).await? {
                if let Ok(value) = serde_json::from_value(entry.data.clone()) {
                    if self.config.enable_memory_cache {
                        let _ = self.memory.set(key.clone(), entry).await;
                    }
                    return Ok(Some(value));
                }
            }
        }

        Ok(None)
    }

    /// Store a value in both layers.
    ///
    /// `ttl` of `None` applies the configured TTL for the key's namespace.
    /// Values larger than `max_entry_size` stay memory-only.
    pub async fn set<T>(&self, key: CacheKey, value: T, ttl: Option<Duration>) -> NevusResult<()>
    where
        T: serde::Serialize,
    {
        let data = serde_json::to_value(value)?;
        let ttl = ttl.unwrap_or_else(|| self.config.ttl_for(&key.namespace));
        let entry = CacheEntry::new(data, Some(ttl));

        if self.config.enable_memory_cache {
            self.memory.set(key.clone(), entry.clone()).await?;
        }

        if let Some(disk) = &self.disk {
            if entry.size_bytes > self.config.max_entry_size {
                debug!(
                    namespace = %key.namespace,
                    size = entry.size_bytes,
                    "entry exceeds max_entry_size, skipping persistent layer"
                );
            } else {
                disk.set(key, entry).await?;
            }
        }

        Ok(())
    }

    /// Remove a value from both layers
    pub async fn remove(&self, key: &CacheKey) -> NevusResult<()> {
        self.memory.remove(key).await?;
        if let Some(disk) = &self.disk {
            disk.remove(key).await?;
        }
        Ok(())
    }

    /// Clear all entries in both layers
    pub async fn clear(&self) -> NevusResult<()> {
        self.memory.clear().await?;
        if let Some(disk) = &self.disk {
            disk.clear().await?;
        }
        Ok(())
    }

    /// Cache statistics across layers
    pub async fn statistics(&self) -> NevusResult<CacheStatistics> {
        let memory_stats = self.memory.statistics().await?;
        let disk_stats = match &self.disk {
            Some(disk) => Some(disk.statistics().await?),
            None => None,
        };

        let total_hits = memory_stats.hits + disk_stats.as_ref().map(|s| s.hits).unwrap_or(0);
        let total_misses =
            memory_stats.misses + disk_stats.as_ref().map(|s| s.misses).unwrap_or(0);

        Ok(CacheStatistics {
            memory_stats,
            disk_stats,
            total_hits,
            total_misses,
        })
    }

    /// Sweep expired entries from both layers
    pub async fn cleanup_expired(&self) -> NevusResult<()> {
        self.memory.cleanup_expired().await?;
        if let Some(disk) = &self.disk {
            disk.cleanup_expired().await?;
        }
        Ok(())
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
