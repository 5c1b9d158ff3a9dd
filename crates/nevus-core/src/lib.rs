//! Nevus Core Library
//!
//! Shared infrastructure for the Nevus client: the error taxonomy, retry and
//! backoff machinery for remote calls, persistent key-value storage, and the
//! stale-tolerant record cache used by domain screens.

pub mod cache;
pub mod error;
pub mod recovery;
pub mod storage;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheEntry, CacheKey, CacheManager, CacheStatistics};
pub use error::{NetworkErrorKind, NevusError, NevusResult};
pub use recovery::{classify_error, ErrorClass, RetryConfig, RetryPolicy, RetryResult};
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
