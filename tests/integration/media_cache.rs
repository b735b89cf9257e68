//! Integration tests for the two-tier media cache

use frameproxy::config::{CacheConfig, ServerConfig};
use frameproxy::error::StorageError;
use frameproxy::media::id::created_at_from_file_name;
use frameproxy::media::{MediaCache, SweepOutcome, SweepReport};
use std::sync::Arc;
use tempfile::TempDir;

const TTL_MS: i64 = 60_000;

fn cache_in(temp_dir: &TempDir) -> MediaCache {
    let cache = CacheConfig {
        ephemeral_root: temp_dir.path().join("public"),
        index_root: temp_dir.path().join("index"),
        ttl_ms: TTL_MS as u64,
        ..CacheConfig::default()
    };
    let server = ServerConfig {
        base_url: "https://proxy.example.com/".to_string(),
        ..ServerConfig::default()
    };
    MediaCache::new(&cache, &server).unwrap()
}

#[tokio::test]
async fn test_png_round_trip_through_both_tiers() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    let bytes = b"\x89PNG\r\n\x1a\nrest of the image";

    let stored = cache
        .store(bytes, "image/png", Some("https://frames.example.com/f?x=1"), true)
        .await
        .unwrap();

    assert!(stored
        .public_url
        .starts_with("https://proxy.example.com/public/"));
    assert!(stored.public_url.ends_with(".png"));
    let file_name = stored.public_url.rsplit('/').next().unwrap();
    assert_eq!(
        created_at_from_file_name(file_name),
        Some(stored.id.created_at_ms())
    );
    assert_eq!(
        std::fs::read(temp_dir.path().join("public").join(file_name)).unwrap(),
        bytes
    );

    let index_url = stored.index_url.unwrap();
    assert_eq!(
        index_url,
        "https://proxy.example.com/index/httpsframesexamplecomfx1.png"
    );
    assert_eq!(
        std::fs::read(temp_dir.path().join("index/httpsframesexamplecomfx1.png")).unwrap(),
        bytes
    );
    assert_eq!(
        cache
            .indexed_url("https://frames.example.com/f?x=1", "image/png")
            .await,
        Some(index_url)
    );

    // No temp files left behind
    let leftovers = std::fs::read_dir(temp_dir.path().join("public"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_ttl_boundary_is_exclusive() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    let created = 1_700_000_000_000_i64;

    cache
        .store_at(b"one", "image/png", None, false, created)
        .await
        .unwrap();

    // Exactly at the TTL the artifact survives
    let at_ttl = cache.sweep_expired_at(created + TTL_MS).await.unwrap();
    assert_eq!(
        at_ttl,
        SweepOutcome::Completed(SweepReport {
            scanned: 1,
            removed: 0
        })
    );

    let past_ttl = cache.sweep_expired_at(created + TTL_MS + 1).await.unwrap();
    assert_eq!(
        past_ttl,
        SweepOutcome::Completed(SweepReport {
            scanned: 1,
            removed: 1
        })
    );
    assert_eq!(
        std::fs::read_dir(temp_dir.path().join("public"))
            .unwrap()
            .count(),
        0
    );
}

#[tokio::test]
async fn test_sweep_never_touches_index_tier() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    let created = 1_700_000_000_000_i64;

    let stored = cache
        .store_at(b"gif", "image/gif", Some("https://frames.example.com"), true, created)
        .await
        .unwrap();
    cache
        .sweep_expired_at(created + 10 * TTL_MS)
        .await
        .unwrap();

    let index_file = stored.index_url.unwrap();
    let index_file = index_file.rsplit('/').next().unwrap();
    assert!(temp_dir.path().join("index").join(index_file).is_file());
}

#[tokio::test]
async fn test_foreign_files_survive_sweep() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    std::fs::write(temp_dir.path().join("public/README"), "keep me").unwrap();

    cache.sweep_expired_at(i64::MAX).await.unwrap();
    assert!(temp_dir.path().join("public/README").is_file());
}

#[tokio::test]
async fn test_unsupported_mime_type_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);

    let result = cache.store(b"<svg/>", "text/html", None, false).await;
    assert!(matches!(result, Err(StorageError::UnsupportedMimeType(_))));

    let result = cache.store(b"png", "image/png", None, true).await;
    assert!(matches!(result, Err(StorageError::MissingSourceUrl)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stores_get_distinct_ids() {
    let temp_dir = TempDir::new().unwrap();
    let cache = Arc::new(cache_in(&temp_dir));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .store(format!("image {}", i).as_bytes(), "image/jpeg", None, false)
                    .await
                    .unwrap()
                    .public_url
            })
        })
        .collect();

    let mut urls = Vec::new();
    for handle in handles {
        urls.push(handle.await.unwrap());
    }
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 16);
}
