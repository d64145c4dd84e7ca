//! Single-key and batch operations

use crate::common::*;
use keyspan_driver::MemoryCluster;
use keyspan_engine::RawClient;

// ============================================================================
// Single key
// ============================================================================

#[tokio::test]
async fn put_then_get() {
    let test = TestCluster::new();
    let raw = test.raw().await;

    raw.put("user:1", "alice").await.unwrap();
    assert_eq!(raw.get("user:1").await.unwrap(), Some(b"alice".to_vec()));

    raw.put("user:1", "bob").await.unwrap();
    assert_eq!(raw.get("user:1").await.unwrap(), Some(b"bob".to_vec()));
}

#[tokio::test]
async fn missing_key_is_none_not_error() {
    let test = TestCluster::new();
    let raw = test.raw().await;
    assert_eq!(raw.get("absent").await.unwrap(), None);
    raw.delete("absent").await.unwrap();
}

#[tokio::test]
async fn delete_removes_key() {
    let test = TestCluster::new();
    let raw = test.raw().await;
    raw.put("k", "v").await.unwrap();
    raw.delete("k").await.unwrap();
    assert_eq!(raw.get("k").await.unwrap(), None);
}

#[tokio::test]
async fn raw_and_transactional_keyspaces_are_distinct() {
    let test = TestCluster::new();
    let raw = test.raw().await;
    let txns = test.txn_client().await;

    raw.put("k", "raw").await.unwrap();
    let mut txn = txns.begin_optimistic().await.unwrap();
    assert_eq!(txn.get("k").await.unwrap(), None);
    txn.rollback().await.unwrap();
}

// ============================================================================
// Batches
// ============================================================================

#[tokio::test]
async fn batch_get_returns_present_subset() {
    let test = TestCluster::new();
    let raw = test.raw().await;
    raw.batch_put(vec![pair("a", "1"), pair("b", "2"), pair("c", "3")])
        .await
        .unwrap();
    raw.put("b", "22").await.unwrap();

    let mut found = raw.batch_get(["a", "b", "missing"]).await.unwrap();
    found.sort_by(|x, y| x.key().cmp(y.key()));
    assert_eq!(found, vec![pair("a", "1"), pair("b", "22")]);
}

#[tokio::test]
async fn batch_delete_and_delete_range() {
    let test = TestCluster::new();
    let raw = test.raw().await;
    raw.batch_put(["a", "b", "c", "d", "e"].map(|k| pair(k, k)))
        .await
        .unwrap();

    raw.batch_delete(["a"]).await.unwrap();
    raw.delete_range(key("b")..key("d")).await.unwrap();

    let left = raw.scan_keys(.., 10).await.unwrap();
    assert_eq!(left, vec![key("d"), key("e")]);
}

#[tokio::test]
async fn empty_batches_are_no_ops() {
    let test = TestCluster::new();
    let raw = test.raw().await;
    test.cluster
        .fail_next("raw_batch_put", Error::StoreUnavailable("down".into()));

    raw.batch_put(Vec::<KvPair>::new()).await.unwrap();
    assert!(raw.batch_get(Vec::<Key>::new()).await.unwrap().is_empty());
}

// ============================================================================
// Connection
// ============================================================================

#[tokio::test]
async fn unreachable_endpoints_fail_to_connect() {
    init_tracing();
    let cluster = MemoryCluster::new();
    let err = RawClient::connect(&cluster, vec!["mem://nowhere", "mem://else"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection(_)));

    let err = RawClient::connect(&cluster, Vec::<String>::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}

#[tokio::test]
async fn invalid_column_family_never_reaches_the_cluster() {
    let err = "data".parse::<ColumnFamily>().unwrap_err();
    assert_eq!(err, Error::InvalidColumnFamily("data".into()));

    let test = TestCluster::new();
    let raw = test.raw().await;
    let lock_cf = raw.with_cf("lock".parse().unwrap());
    lock_cf.put("k", "v").await.unwrap();
    assert_eq!(raw.get("k").await.unwrap(), None);
}
