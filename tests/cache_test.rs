//! Tests for [`ResponseCache`]: per-entry TTLs and the two-tier keying.

use std::time::Duration;

use munin::cache::{ResponseCache, stale_key};

#[tokio::test]
async fn miss_then_hit() {
    let cache = ResponseCache::new();
    assert!(cache.get("http://api.internal/list").await.is_none());

    cache
        .insert("http://api.internal/list", "body", Duration::from_secs(60))
        .await;
    assert_eq!(
        cache.get("http://api.internal/list").await.as_deref(),
        Some("body")
    );
}

#[tokio::test]
async fn entries_expire_after_their_ttl() {
    let cache = ResponseCache::new();
    cache
        .insert("http://api.internal/list", "body", Duration::from_millis(80))
        .await;
    assert!(cache.get("http://api.internal/list").await.is_some());

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(cache.get("http://api.internal/list").await.is_none());
}

#[tokio::test]
async fn per_entry_ttls_are_independent() {
    let cache = ResponseCache::new();
    cache
        .insert("short", "live copy", Duration::from_millis(80))
        .await;
    cache
        .insert("long", "stale copy", Duration::from_secs(600))
        .await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(cache.get("short").await.is_none());
    assert_eq!(cache.get("long").await.as_deref(), Some("stale copy"));
}

#[tokio::test]
async fn overwriting_restarts_the_clock() {
    let cache = ResponseCache::new();
    cache
        .insert("key", "first", Duration::from_millis(200))
        .await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    cache
        .insert("key", "second", Duration::from_millis(200))
        .await;

    // 240ms after the first write, but only 120ms after the second: the
    // rewrite's TTL is what counts.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(cache.get("key").await.as_deref(), Some("second"));

    tokio::time::sleep(Duration::from_millis(160)).await;
    assert!(cache.get("key").await.is_none());
}

#[tokio::test]
async fn live_and_stale_entries_coexist_per_url() {
    let cache = ResponseCache::new();
    let url = "http://api.internal/list";

    cache.insert(url, "live body", Duration::from_secs(60)).await;
    cache
        .insert(stale_key(url), "stale body", Duration::from_secs(600))
        .await;

    assert_eq!(cache.get(url).await.as_deref(), Some("live body"));
    assert_eq!(
        cache.get(&stale_key(url)).await.as_deref(),
        Some("stale body")
    );
}

#[tokio::test]
async fn flush_drops_every_tier() {
    let cache = ResponseCache::new();
    let url = "http://api.internal/list";
    cache.insert(url, "live body", Duration::from_secs(60)).await;
    cache
        .insert(stale_key(url), "stale body", Duration::from_secs(600))
        .await;

    cache.flush();

    assert!(cache.get(url).await.is_none());
    assert!(cache.get(&stale_key(url)).await.is_none());
}
