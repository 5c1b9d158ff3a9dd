//! Key-value store backends
//!
//! `FileKeyValueStore` keeps one file per key under a base directory with
//! restrictive permissions. `MemoryKeyValueStore` backs tests and embedded
//! use.

use super::KeyValueStore;
use crate::error::{NevusError, NevusResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::warn;

const ENTRY_EXT: &str = "kv";

/// File-per-key store under a base directory
pub struct FileKeyValueStore {
    base_path: PathBuf,
}

impl FileKeyValueStore {
    /// Create a store rooted at the given directory
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Store under `~/.nevus/store`, creating it with owner-only permissions
    pub fn default_location() -> NevusResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| NevusError::storage("cannot determine home directory"))?;
        let path = home.join(".nevus").join("store");
        create_private_dir(&path)?;
        Ok(Self::new(path))
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        // Sanitize key to prevent path traversal
        let safe_key = key.replace(['/', '\\'], "_").replace("..", "_");
        self.base_path.join(format!("{}.{}", safe_key, ENTRY_EXT))
    }

    async fn ensure_dir(&self) -> NevusResult<()> {
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| NevusError::io_with_path(e.to_string(), self.base_path.display().to_string()))?;
        restrict_permissions(&self.base_path, 0o700);
        Ok(())
    }
}

fn create_private_dir(path: &Path) -> NevusResult<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| NevusError::io_with_path(e.to_string(), path.display().to_string()))?;
    restrict_permissions(path, 0o700);
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    if let Err(e) = std::fs::set_permissions(path, perms) {
        warn!("failed to restrict permissions on {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) {}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> NevusResult<Option<String>> {
        let path = self.entry_path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NevusError::io_with_path(
                e.to_string(),
                path.display().to_string(),
            )),
        }
    }

    async fn put(&self, key: &str, value: &str) -> NevusResult<()> {
        self.ensure_dir().await?;
        let path = self.entry_path(key);
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| NevusError::io_with_path(e.to_string(), path.display().to_string()))?;
        file.write_all(value.as_bytes())
            .await
            .map_err(|e| NevusError::io_with_path(e.to_string(), path.display().to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| NevusError::io_with_path(e.to_string(), path.display().to_string()))?;
        restrict_permissions(&path, 0o600);
        Ok(())
    }

    async fn put_nosync(&self, key: &str, value: &str) -> NevusResult<()> {
        self.ensure_dir().await?;
        let path = self.entry_path(key);
        tokio::fs::write(&path, value.as_bytes())
            .await
            .map_err(|e| NevusError::io_with_path(e.to_string(), path.display().to_string()))?;
        restrict_permissions(&path, 0o600);
        Ok(())
    }

    async fn remove(&self, key: &str) -> NevusResult<bool> {
        let path = self.entry_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(NevusError::io_with_path(
                e.to_string(),
                path.display().to_string(),
            )),
        }
    }

    async fn contains(&self, key: &str) -> NevusResult<bool> {
        Ok(tokio::fs::try_exists(self.entry_path(key))
            .await
            .unwrap_or(false))
    }

    async fn keys(&self) -> NevusResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.base_path).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(NevusError::io(e.to_string())),
        };
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| NevusError::io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXT) {
                if let Some(stem) = path.file_stem() {
                    keys.push(stem.to_string_lossy().to_string());
                }
            }
        }
        Ok(keys)
    }
}

/// In-memory store for tests and embedded fallback
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> NevusResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> NevusResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn put_nosync(&self, key: &str, value: &str) -> NevusResult<()> {
        self.put(key, value).await
    }

    async fn remove(&self, key: &str) -> NevusResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn contains(&self, key: &str) -> NevusResult<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn keys(&self) -> NevusResult<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(dir.path());

        store.put("alpha", "one").await.unwrap();
        assert_eq!(store.get("alpha").await.unwrap().as_deref(), Some("one"));
        assert!(store.contains("alpha").await.unwrap());

        assert!(store.remove("alpha").await.unwrap());
        assert!(!store.remove("alpha").await.unwrap());
        assert_eq!(store.get("alpha").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_sanitizes_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(dir.path());

        store.put("../escape/attempt", "v").await.unwrap();
        let keys = store.keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert!(!keys[0].contains('/'));
    }

    #[tokio::test]
    async fn nosync_write_is_readable() {
        let dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(dir.path());

        store.put_nosync("k", "fast").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("fast"));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryKeyValueStore::new();
        store.put("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.remove("k").await.unwrap());
        assert!(!store.contains("k").await.unwrap());
    }
}
