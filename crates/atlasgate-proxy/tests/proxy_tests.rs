//! CacheProxy against a temp cache root and scripted origins.

mod common;

use std::{sync::atomic::Ordering, time::Duration};

use atlasgate_proxy::{CacheProxy, DiskCache, ProxyError, ResponseSource};
use bytes::Bytes;
use common::{Behavior, MockOrigin, fast_policy, wait_for_file};
use tempfile::TempDir;

fn proxy(dir: &TempDir, origin: MockOrigin) -> CacheProxy<MockOrigin> {
    CacheProxy::new(origin, DiskCache::new(dir.path()), fast_policy())
}

// =============================================================================
// Cache lookup and write-back
// =============================================================================

#[tokio::test]
async fn test_fetch_then_serve_from_disk() {
    let dir = TempDir::new().unwrap();
    let origin = MockOrigin::new(Behavior::Ok {
        body: Bytes::from_static(b"PNGDATA"),
        content_type: Some("image/png"),
    });
    let calls = origin.calls();
    let proxy = proxy(&dir, origin);

    let first = proxy
        .handle("renderer://cdn.example.com/img/cat.png")
        .await
        .unwrap();
    assert_eq!(first.status, 200);
    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(first.content_type, "image/png");
    assert_eq!(first.body, Bytes::from_static(b"PNGDATA"));

    let cached = dir.path().join("img/cat.png");
    assert!(wait_for_file(&cached).await);
    assert_eq!(std::fs::read(&cached).unwrap(), b"PNGDATA");

    let second = proxy
        .handle("renderer://cdn.example.com/img/cat.png")
        .await
        .unwrap();
    assert_eq!(second.source, ResponseSource::Disk);
    assert_eq!(second.content_type, "image/png");
    assert_eq!(second.body, first.body);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stats = proxy.stats().snapshot();
    assert_eq!(stats.disk_hits, 1);
    assert_eq!(stats.disk_misses, 1);

    // The rename lands just before the writer records it.
    for _ in 0..100 {
        if proxy.stats().snapshot().cache_writes == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(proxy.stats().snapshot().cache_writes, 1);
}

#[tokio::test]
async fn test_clear_forces_refetch() {
    let dir = TempDir::new().unwrap();
    let origin = MockOrigin::ok(b"v1");
    let calls = origin.calls();
    let proxy = proxy(&dir, origin);

    proxy.handle("renderer://cdn.example.com/app.js").await.unwrap();
    assert!(wait_for_file(&dir.path().join("app.js")).await);

    proxy.clear().await.unwrap();
    assert!(dir.path().is_dir());
    assert!(!dir.path().join("app.js").exists());

    let again = proxy.handle("renderer://cdn.example.com/app.js").await.unwrap();
    assert_eq!(again.source, ResponseSource::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_content_type_falls_back_to_extension() {
    let dir = TempDir::new().unwrap();
    let proxy = proxy(&dir, MockOrigin::ok(b"{}"));

    let json = proxy.handle("renderer://h/data/config.json").await.unwrap();
    assert_eq!(json.content_type, "application/json");

    let blob = proxy.handle("renderer://h/data/blob").await.unwrap();
    assert_eq!(blob.content_type, "application/octet-stream");
}

#[tokio::test]
async fn test_trailing_slash_caches_index() {
    let dir = TempDir::new().unwrap();
    let proxy = proxy(&dir, MockOrigin::ok(b"<html></html>"));

    proxy.handle("renderer://h/docs/").await.unwrap();
    assert!(wait_for_file(&dir.path().join("docs/index.html")).await);
}

#[tokio::test]
async fn test_percent_encoded_path_is_decoded() {
    let dir = TempDir::new().unwrap();
    let proxy = proxy(&dir, MockOrigin::ok(b"a"));

    proxy.handle("renderer://h/my%20file.txt").await.unwrap();
    assert!(wait_for_file(&dir.path().join("my file.txt")).await);
}

#[tokio::test]
async fn test_empty_cache_file_falls_back_to_network() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("empty.js"), b"").unwrap();
    let origin = MockOrigin::ok(b"console.log(1)");
    let calls = origin.calls();
    let proxy = proxy(&dir, origin);

    let response = proxy.handle("renderer://h/empty.js").await.unwrap();
    assert_eq!(response.source, ResponseSource::Network);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(proxy.stats().snapshot().corrupt_reads, 1);
}

#[tokio::test]
async fn test_unreadable_cache_entry_falls_back_to_network() {
    let dir = TempDir::new().unwrap();
    // A directory where the cache file should be cannot be read as a file.
    std::fs::create_dir_all(dir.path().join("odd.css")).unwrap();
    let origin = MockOrigin::ok(b"body{}");
    let calls = origin.calls();
    let proxy = proxy(&dir, origin);

    let response = proxy.handle("renderer://h/odd.css").await.unwrap();
    assert_eq!(response.body, Bytes::from_static(b"body{}"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(proxy.stats().snapshot().corrupt_reads, 1);
}

// =============================================================================
// Dedup and failures
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_fetch() {
    let dir = TempDir::new().unwrap();
    let origin = MockOrigin::new(Behavior::Slow {
        delay: Duration::from_millis(300),
        body: Bytes::from_static(b"shared"),
    });
    let calls = origin.calls();
    let proxy = proxy(&dir, origin);

    let url = "renderer://h/big/asset.bin";
    let (a, b, c) = tokio::join!(proxy.handle(url), proxy.handle(url), proxy.handle(url));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for response in [a, b, c] {
        assert_eq!(response.unwrap().body, Bytes::from_static(b"shared"));
    }
    assert_eq!(proxy.stats().snapshot().dedup_joins, 2);
    assert_eq!(proxy.pending_count(), 0);
}

#[tokio::test]
async fn test_cancelled_caller_does_not_strand_waiters() {
    let dir = TempDir::new().unwrap();
    let origin = MockOrigin::new(Behavior::Slow {
        delay: Duration::from_millis(200),
        body: Bytes::from_static(b"ok"),
    });
    let calls = origin.calls();
    let proxy = proxy(&dir, origin);
    let url = "renderer://h/slow.txt";

    // The first caller gives up early; the fetch keeps running for the second.
    let first = tokio::time::timeout(Duration::from_millis(20), proxy.handle(url)).await;
    assert!(first.is_err());
    let second = proxy.handle(url).await.unwrap();

    assert_eq!(second.body, Bytes::from_static(b"ok"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(proxy.pending_count(), 0);
}

#[tokio::test]
async fn test_non_200_passes_through_uncached() {
    let dir = TempDir::new().unwrap();
    let origin = MockOrigin::new(Behavior::Status(404));
    let calls = origin.calls();
    let proxy = proxy(&dir, origin);

    let response = proxy.handle("renderer://h/missing.png").await.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.body, Bytes::from_static(b"Origin fetch failed"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!dir.path().join("missing.png").exists());
}

#[tokio::test]
async fn test_exhausted_retries_become_bad_gateway() {
    let dir = TempDir::new().unwrap();
    let origin = MockOrigin::new(Behavior::Fail);
    let calls = origin.calls();
    let proxy = proxy(&dir, origin);

    let err = proxy.handle("renderer://h/down.png").await.unwrap_err();
    assert!(matches!(err, ProxyError::RetriesExhausted { .. }));
    assert_eq!(err.status_code(), 502);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(proxy.pending_count(), 0);
}

#[tokio::test]
async fn test_encoded_traversal_is_rejected() {
    let dir = TempDir::new().unwrap();
    let origin = MockOrigin::ok(b"secret");
    let calls = origin.calls();
    let proxy = proxy(&dir, origin);

    let err = proxy
        .handle("renderer://h/%2E%2E%2F%2E%2E%2Fetc%2Fpasswd")
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::InvalidPath { .. }));
    assert_eq!(err.status_code(), 400);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
