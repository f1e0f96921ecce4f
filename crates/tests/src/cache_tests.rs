//! Integration tests for TTL expiry, eviction, and snapshot persistence.

use std::time::Duration;

use phyto_core::cache::{CacheConfig, ResultCache};
use regex::Regex;

fn memory_cache(max_entries: usize) -> ResultCache {
    ResultCache::new(CacheConfig { max_entries, ..CacheConfig::default() })
}

#[tokio::test]
async fn test_ttl_miss_after_expiry_and_hit_before() {
    let cache = memory_cache(16);

    cache.set("plant:1", &"verdict", Some(Duration::from_millis(10)));
    tokio::time::sleep(Duration::from_millis(15)).await;
    assert!(cache.get::<String>("plant:1").is_none(), "expired entry must miss");

    cache.set("plant:2", &"verdict", Some(Duration::from_millis(10)));
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(cache.get::<String>("plant:2").as_deref(), Some("verdict"));
}

#[tokio::test]
async fn test_filling_past_capacity_evicts_exactly_the_oldest() {
    let cache = memory_cache(4);

    for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
        cache.set(key, &i, None);
        tokio::time::sleep(Duration::from_millis(3)).await;
    }
    cache.set("e", &4, None);

    assert!(cache.get::<usize>("a").is_none(), "only the oldest write is evicted");
    for key in ["b", "c", "d", "e"] {
        assert!(cache.get::<usize>(key).is_some(), "newer entry {key} must survive");
    }
    assert_eq!(cache.stats().total, 4);
}

#[tokio::test]
async fn test_structured_values_round_trip() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Verdict {
        healthy: bool,
        names: Vec<String>,
    }

    let cache = memory_cache(4);
    let stored = Verdict { healthy: false, names: vec!["late blight".to_string()] };
    cache.set("diagnosis:u1:abc", &stored, None);

    assert_eq!(cache.get::<Verdict>("diagnosis:u1:abc"), Some(stored));
}

#[tokio::test]
async fn test_pattern_invalidation_cascades_across_namespace() {
    let cache = memory_cache(16);
    cache.set("diagnosis:u1:img1", &1, None);
    cache.set("diagnosis:u1:img2", &2, None);
    cache.set("diagnosis:u2:img1", &3, None);
    cache.set("taxonomy:any:rust", &4, None);

    cache.invalidate_pattern(&Regex::new("^diagnosis:u1:").unwrap());

    assert_eq!(cache.stats().total, 2);
    assert!(cache.get::<i32>("diagnosis:u2:img1").is_some());
    assert!(cache.get::<i32>("taxonomy:any:rust").is_some());
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
        snapshot_path: Some(dir.path().join("snapshot.json")),
        ..CacheConfig::default()
    };

    {
        let cache = ResultCache::new(config.clone());
        cache.set("diagnosis:u1:img1", &"late blight", Some(Duration::from_secs(120)));
        cache.set("diagnosis:u1:img2", &"healthy", Some(Duration::from_secs(120)));
    }

    let restored = ResultCache::new(config);
    assert_eq!(restored.get::<String>("diagnosis:u1:img1").as_deref(), Some("late blight"));
    assert_eq!(restored.get::<String>("diagnosis:u1:img2").as_deref(), Some("healthy"));
}

#[tokio::test]
async fn test_snapshot_preserves_ttl_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig {
        snapshot_path: Some(dir.path().join("snapshot.json")),
        ..CacheConfig::default()
    };

    {
        let cache = ResultCache::new(config.clone());
        cache.set("short", &1, Some(Duration::from_millis(10)));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    let restored = ResultCache::new(config);
    assert!(restored.get::<i32>("short").is_none(), "restored entry keeps its original TTL");
}

#[tokio::test]
async fn test_corrupt_snapshot_degrades_to_cold_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, b"{ this is not valid json").unwrap();

    let cache = ResultCache::new(CacheConfig {
        snapshot_path: Some(path),
        ..CacheConfig::default()
    });

    assert_eq!(cache.stats().total, 0);
    // the cache still works after discarding the snapshot
    cache.set("k", &1, None);
    assert_eq!(cache.get::<i32>("k"), Some(1));
}

#[tokio::test]
async fn test_unwritable_snapshot_path_never_fails_mutations() {
    let cache = ResultCache::new(CacheConfig {
        snapshot_path: Some("/nonexistent-dir/definitely/missing/snapshot.json".into()),
        ..CacheConfig::default()
    });

    cache.set("k", &1, None);
    assert_eq!(cache.get::<i32>("k"), Some(1), "persistence failure degrades, never errors");
    cache.invalidate("k");
    cache.clear();
}

#[tokio::test]
async fn test_concurrent_mutations_are_safe() {
    let cache = std::sync::Arc::new(memory_cache(64));

    let mut handles = Vec::new();
    for task in 0..8u32 {
        let cache = std::sync::Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for i in 0..32u32 {
                let key = format!("diagnosis:u{task}:{i}");
                cache.set(&key, &(task * 100 + i), None);
                let _ = cache.get::<u32>(&key);
                if i % 8 == 0 {
                    cache.invalidate(&key);
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = cache.stats();
    assert!(stats.total <= 64, "store never exceeds its bound");
}
