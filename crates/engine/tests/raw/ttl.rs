//! Per-key expiry
//!
//! Tokio's clock is paused so expiry is driven by `advance`.

use crate::common::*;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn key_expires_after_ttl() {
    let test = TestCluster::new();
    let raw = test.raw().await;

    raw.put_with_ttl("session", "token", 10).await.unwrap();
    assert_eq!(raw.get_key_ttl_secs("session").await.unwrap(), Some(10));

    tokio::time::advance(Duration::from_secs(4)).await;
    assert_eq!(raw.get("session").await.unwrap(), Some(b"token".to_vec()));
    assert_eq!(raw.get_key_ttl_secs("session").await.unwrap(), Some(6));

    tokio::time::advance(Duration::from_millis(5500)).await;
    assert_eq!(raw.get_key_ttl_secs("session").await.unwrap(), Some(1));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(raw.get("session").await.unwrap(), None);
    assert_eq!(raw.get_key_ttl_secs("session").await.unwrap(), None);
    assert!(raw.scan(.., 10).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn zero_ttl_never_expires() {
    let test = TestCluster::new();
    let raw = test.raw().await;

    raw.put_with_ttl("k", "v", 0).await.unwrap();
    raw.put("plain", "v").await.unwrap();
    assert_eq!(raw.get_key_ttl_secs("k").await.unwrap(), None);
    assert_eq!(raw.get_key_ttl_secs("plain").await.unwrap(), None);

    tokio::time::advance(Duration::from_secs(86_400)).await;
    assert!(raw.get("k").await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn batch_put_with_per_key_ttl() {
    let test = TestCluster::new();
    let raw = test.raw().await;

    raw.batch_put_with_ttl(vec![("short", "1", 1), ("long", "2", 100), ("forever", "3", 0)])
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    let keys = raw.scan_keys(.., 10).await.unwrap();
    assert_eq!(keys, vec![key("forever"), key("long")]);
}

#[tokio::test(start_paused = true)]
async fn overwrite_without_ttl_clears_expiry() {
    let test = TestCluster::new();
    let raw = test.raw().await;

    raw.put_with_ttl("k", "v1", 5).await.unwrap();
    raw.put("k", "v2").await.unwrap();
    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(raw.get("k").await.unwrap(), Some(b"v2".to_vec()));
}

#[tokio::test(start_paused = true)]
async fn ttl_too_large_for_the_clock_never_expires() {
    let test = TestCluster::new();
    let raw = test.raw().await;

    raw.put_with_ttl("k", "v", u64::MAX).await.unwrap();
    raw.batch_put_with_ttl(vec![("a", "1", u64::MAX), ("b", "2", 5)])
        .await
        .unwrap();

    assert_eq!(raw.get("k").await.unwrap(), Some(b"v".to_vec()));
    assert_eq!(raw.get_key_ttl_secs("k").await.unwrap(), None);
    assert_eq!(raw.get_key_ttl_secs("a").await.unwrap(), None);
    assert_eq!(raw.get_key_ttl_secs("b").await.unwrap(), Some(5));

    tokio::time::advance(Duration::from_secs(86_400)).await;
    assert_eq!(raw.scan_keys(.., 10).await.unwrap(), vec![key("a"), key("k")]);
}
