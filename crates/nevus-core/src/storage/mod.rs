//! Persistent key-value storage
//!
//! A small string-keyed, string-valued store with two write modes:
//! durable (`put`, write + fsync) and best-effort (`put_nosync`). Credential
//! blobs and cache metadata both sit on top of this seam.

mod backend;

pub use backend::{FileKeyValueStore, MemoryKeyValueStore};

use crate::error::NevusResult;
use async_trait::async_trait;

/// String-keyed persistent storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> NevusResult<Option<String>>;

    /// Write durably: the call does not return success until the value is
    /// committed to stable storage
    async fn put(&self, key: &str, value: &str) -> NevusResult<()>;

    /// Write best-effort: the value is handed to the OS without waiting for
    /// a sync. Suitable for data that can be rebuilt on loss.
    async fn put_nosync(&self, key: &str, value: &str) -> NevusResult<()>;

    /// Remove the entry. Returns true if it existed. Idempotent.
    async fn remove(&self, key: &str) -> NevusResult<bool>;

    /// Check whether a key is present
    async fn contains(&self, key: &str) -> NevusResult<bool>;

    /// List all stored keys
    async fn keys(&self) -> NevusResult<Vec<String>>;
}
