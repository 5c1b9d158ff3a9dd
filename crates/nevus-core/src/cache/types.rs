//! Cache types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::time::Duration;

/// Cache key for identifying cached entries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Key namespace (e.g., "analysis", "lesion")
    pub namespace: String,
    /// Unique identifier within the namespace
    pub identifier: String,
    /// Hash of the key for fast comparison
    pub hash: u64,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(namespace: impl Into<String>, identifier: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let identifier = identifier.into();

        let mut hasher = DefaultHasher::new();
        namespace.hash(&mut hasher);
        identifier.hash(&mut hasher);
        let hash = hasher.finish();

        Self {
            namespace,
            identifier,
            hash,
        }
    }

    /// Key for a cached risk-analysis result
    pub fn analysis(analysis_id: &str) -> Self {
        Self::new("analysis", analysis_id)
    }

    /// Key for a cached lesion record
    pub fn lesion(lesion_id: &str) -> Self {
        Self::new("lesion", lesion_id)
    }

    /// Key for a cached user profile
    pub fn profile(user_id: &str) -> Self {
        Self::new("profile", user_id)
    }
}

/// Cache entry containing data and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cached data
    pub data: serde_json::Value,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// When the entry expires (None means no expiration)
    pub expires_at: Option<DateTime<Utc>>,
    /// Size of the entry in bytes
    pub size_bytes: usize,
    /// Number of times this entry has been accessed
    pub access_count: u64,
    /// Last access time
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    /// Create a new cache entry
    pub fn new(data: serde_json::Value, ttl: Option<Duration>) -> Self {
        let now = Utc::now();
        let expires_at = ttl.and_then(|d| chrono::Duration::from_std(d).ok().map(|d| now + d));
        let size_bytes = data.to_string().len();

        Self {
            data,
            created_at: now,
            expires_at,
            size_bytes,
            access_count: 0,
            last_accessed: now,
        }
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Utc::now() >= expires_at)
    }

    /// Mark the entry as accessed
    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
    }

    /// Get the age of the entry
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the in-memory layer
    pub enable_memory_cache: bool,
    /// Memory cache capacity (number of entries)
    pub memory_capacity: usize,
    /// Enable the persistent layer
    pub enable_disk_cache: bool,
    /// Persistent layer directory
    pub disk_cache_dir: PathBuf,
    /// Persistent layer capacity in bytes
    pub disk_capacity: u64,
    /// Default TTL for cache entries
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// TTL for risk-analysis results
    #[serde(with = "humantime_serde")]
    pub analysis_ttl: Duration,
    /// TTL for lesion records
    #[serde(with = "humantime_serde")]
    pub lesion_ttl: Duration,
    /// TTL for user profiles
    #[serde(with = "humantime_serde")]
    pub profile_ttl: Duration,
    /// Cleanup interval for expired entries
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Entries larger than this skip the persistent layer
    pub max_entry_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_memory_cache: true,
            memory_capacity: 500,
            enable_disk_cache: true,
            disk_cache_dir: PathBuf::from("cache"),
            disk_capacity: 50 * 1024 * 1024, // 50MB
            default_ttl: Duration::from_secs(3600),
            analysis_ttl: Duration::from_secs(3600),
            lesion_ttl: Duration::from_secs(3600),
            profile_ttl: Duration::from_secs(1800),
            cleanup_interval: Duration::from_secs(300),
            max_entry_size: 1024 * 1024, // 1MB
        }
    }
}

impl CacheConfig {
    /// TTL to apply for a given namespace
    pub fn ttl_for(&self, namespace: &str) -> Duration {
        match namespace {
            "analysis" => self.analysis_ttl,
            "lesion" => self.lesion_ttl,
            "profile" => self.profile_ttl,
            _ => self.default_ttl,
        }
    }
}

/// Storage layer statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStatistics {
    /// Number of entries in storage
    pub entry_count: usize,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of evictions
    pub evictions: u64,
}

/// Cache statistics across layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatistics {
    /// Memory layer statistics
    pub memory_stats: StorageStatistics,
    /// Persistent layer statistics (if enabled)
    pub disk_stats: Option<StorageStatistics>,
    /// Total cache hits across all layers
    pub total_hits: u64,
    /// Total cache misses across all layers
    pub total_misses: u64,
}

impl CacheStatistics {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_hits + self.total_misses;
        if total == 0 {
            0.0
        } else {
            self.total_hits as f64 / total as f64
        }
    }

    /// Total entries across all layers
    pub fn total_entries(&self) -> usize {
        self.memory_stats.entry_count
            + self.disk_stats.as_ref().map(|s| s.entry_count).unwrap_or(0)
    }
}
