//! Record cache tests

use super::storage::{CacheStorage, DiskStorage, MemoryStorage};
use super::types::{CacheConfig, CacheEntry, CacheKey};
use super::CacheManager;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AnalysisRecord {
    id: String,
    risk_score: f64,
    verdict: String,
}

fn sample_record(id: &str) -> AnalysisRecord {
    AnalysisRecord {
        id: id.to_string(),
        risk_score: 0.12,
        verdict: "benign".to_string(),
    }
}

fn memory_only_config() -> CacheConfig {
    CacheConfig {
        enable_disk_cache: false,
        memory_capacity: 10,
        ..Default::default()
    }
}

fn disk_config(dir: &TempDir) -> CacheConfig {
    CacheConfig {
        memory_capacity: 10,
        disk_cache_dir: dir.path().to_path_buf(),
        ..Default::default()
    }
}

#[tokio::test]
async fn memory_storage_basic_operations() {
    let storage = MemoryStorage::new(10);
    let key = CacheKey::analysis("a1");
    let entry = CacheEntry::new(
        serde_json::json!({"risk": 0.3}),
        Some(Duration::from_secs(60)),
    );

    storage.set(key.clone(), entry).await.unwrap();
    assert!(storage.get(&key).await.unwrap().is_some());

    storage.remove(&key).await.unwrap();
    assert!(storage.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn memory_storage_expires_entries() {
    let storage = MemoryStorage::new(10);
    let key = CacheKey::analysis("a1");
    let entry = CacheEntry::new(
        serde_json::json!({"risk": 0.3}),
        Some(Duration::from_millis(20)),
    );

    storage.set(key.clone(), entry).await.unwrap();
    assert!(storage.get(&key).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(storage.get(&key).await.unwrap().is_none());

    let stats = storage.statistics().await.unwrap();
    assert_eq!(stats.entry_count, 0);
}

#[tokio::test]
async fn memory_storage_evicts_at_capacity() {
    let storage = MemoryStorage::new(3);
    for i in 0..5 {
        let key = CacheKey::lesion(&format!("l{}", i));
        let entry = CacheEntry::new(serde_json::json!(i), Some(Duration::from_secs(60)));
        storage.set(key, entry).await.unwrap();
    }

    let stats = storage.statistics().await.unwrap();
    assert_eq!(stats.entry_count, 3);
    assert_eq!(stats.evictions, 2);

    // Oldest entries were evicted
    assert!(storage.get(&CacheKey::lesion("l0")).await.unwrap().is_none());
    assert!(storage.get(&CacheKey::lesion("l4")).await.unwrap().is_some());
}

#[tokio::test]
async fn manager_round_trips_typed_values() {
    let manager = CacheManager::new(memory_only_config()).unwrap();
    let key = CacheKey::analysis("a7");
    let record = sample_record("a7");

    manager.set(key.clone(), record.clone(), None).await.unwrap();
    let cached: Option<AnalysisRecord> = manager.get(&key).await.unwrap();
    assert_eq!(cached, Some(record));
}

#[tokio::test]
async fn manager_misses_after_ttl() {
    let manager = CacheManager::new(memory_only_config()).unwrap();
    let key = CacheKey::analysis("a8");

    manager
        .set(key.clone(), sample_record("a8"), Some(Duration::from_millis(20)))
        .await
        .unwrap();
    let warm: Option<AnalysisRecord> = manager.get(&key).await.unwrap();
    assert!(warm.is_some());

    tokio::time::sleep(Duration::from_millis(40)).await;
    let cold: Option<AnalysisRecord> = manager.get(&key).await.unwrap();
    assert!(cold.is_none());
}

#[tokio::test]
async fn disk_layer_survives_memory_clear() {
    let dir = TempDir::new().unwrap();
    let manager = CacheManager::new(disk_config(&dir)).unwrap();
    let key = CacheKey::lesion("left-arm-3");

    manager
        .set(key.clone(), sample_record("left-arm-3"), None)
        .await
        .unwrap();

    // A fresh manager over the same directory sees the persisted entry
    let reopened = CacheManager::new(disk_config(&dir)).unwrap();
    reopened.initialize().await.unwrap();
    let cached: Option<AnalysisRecord> = reopened.get(&key).await.unwrap();
    assert!(cached.is_some());
}

#[tokio::test]
async fn corrupted_disk_entry_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let storage = DiskStorage::new(dir.path(), 1024 * 1024).unwrap();
    let key = CacheKey::analysis("bad");
    let entry = CacheEntry::new(serde_json::json!({"ok": true}), Some(Duration::from_secs(60)));

    storage.set(key.clone(), entry).await.unwrap();

    // Clobber the file behind the cache's back
    let path = dir.path().join("analysis").join(format!("{}.json", key.hash));
    std::fs::write(&path, "{not json").unwrap();

    assert!(storage.get(&key).await.unwrap().is_none());
    // The corrupted file is removed
    assert!(!path.exists());
}

#[tokio::test]
async fn oversized_entries_stay_memory_only() {
    let dir = TempDir::new().unwrap();
    let config = CacheConfig {
        max_entry_size: 64,
        disk_cache_dir: dir.path().to_path_buf(),
        ..disk_config(&dir)
    };
    let manager = CacheManager::new(config).unwrap();
    let key = CacheKey::analysis("big");

    let big = AnalysisRecord {
        id: "big".to_string(),
        risk_score: 0.99,
        verdict: "x".repeat(512),
    };
    manager.set(key.clone(), big, None).await.unwrap();

    let stats = manager.statistics().await.unwrap();
    assert_eq!(stats.memory_stats.entry_count, 1);
    assert_eq!(stats.disk_stats.unwrap().entry_count, 0);
}

#[tokio::test]
async fn disk_layer_evicts_oldest_when_over_capacity() {
    let dir = TempDir::new().unwrap();
    let storage = DiskStorage::new(dir.path(), 300).unwrap();

    for i in 0..4 {
        let key = CacheKey::analysis(&format!("a{}", i));
        let entry = CacheEntry::new(serde_json::json!({"i": i}), Some(Duration::from_secs(60)));
        storage.set(key, entry).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stats = storage.statistics().await.unwrap();
    assert!(stats.size_bytes <= 300);
    assert!(stats.evictions > 0);

    // The most recent entry is still present
    assert!(storage
        .get(&CacheKey::analysis("a3"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn statistics_track_hits_and_misses() {
    let manager = CacheManager::new(memory_only_config()).unwrap();
    let key = CacheKey::profile("u1");

    let _: Option<AnalysisRecord> = manager.get(&key).await.unwrap();
    manager.set(key.clone(), sample_record("u1"), None).await.unwrap();
    let _: Option<AnalysisRecord> = manager.get(&key).await.unwrap();

    let stats = manager.statistics().await.unwrap();
    assert_eq!(stats.total_hits, 1);
    assert_eq!(stats.total_misses, 1);
    assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
}
