//! Blocking and async calls agree

use crate::common::*;
use keyspan::blocking;
use keyspan::{BoundRange, ColumnFamily, Error, Key, KvPair, MemoryCluster};

fn key(s: &str) -> Key {
    Key::from(s)
}

#[test]
fn raw_round_trip() {
    let cluster = cluster();
    let raw = blocking::RawClient::connect(cluster, vec![ENDPOINT]).unwrap();

    raw.put("k", "v").unwrap();
    assert_eq!(raw.get("k").unwrap(), Some(b"v".to_vec()));
    raw.batch_put(vec![KvPair::new("a", "1"), KvPair::new("b", "2")])
        .unwrap();
    assert_eq!(raw.batch_get(["a", "b", "zz"]).unwrap().len(), 2);

    raw.delete("k").unwrap();
    assert_eq!(raw.get("k").unwrap(), None);

    raw.batch_delete(["a"]).unwrap();
    raw.delete_range(key("b")..).unwrap();
    assert!(raw.scan(.., 10).unwrap().is_empty());
}

#[test]
fn raw_ttl_and_column_families() {
    let raw = blocking::RawClient::connect(cluster(), vec![ENDPOINT]).unwrap();

    raw.put_with_ttl("session", "token", 60).unwrap();
    let remaining = raw.get_key_ttl_secs("session").unwrap().unwrap();
    assert!(remaining > 0 && remaining <= 60);

    raw.batch_put_with_ttl(vec![("x", "1", 0)]).unwrap();
    assert_eq!(raw.get_key_ttl_secs("x").unwrap(), None);

    let writes = raw.with_cf(ColumnFamily::Write);
    assert_eq!(writes.column_family(), ColumnFamily::Write);
    assert_eq!(writes.get("session").unwrap(), None);
    assert_eq!(
        raw.scan_keys(BoundRange::new(None, None, true, false), 10).unwrap(),
        vec![key("session"), key("x")]
    );
}

#[test]
fn scan_limit_error_is_the_same_in_both_forms() {
    let cluster = cluster();
    let raw = blocking::RawClient::connect(cluster.clone(), vec![ENDPOINT]).unwrap();
    let blocking_err = raw.scan(.., 20_000).unwrap_err();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let async_err = runtime.block_on(async {
        let raw = keyspan::RawClient::connect(&cluster, vec![ENDPOINT]).await.unwrap();
        raw.scan(.., 20_000).await.unwrap_err()
    });
    assert_eq!(blocking_err, async_err);
}

#[test]
fn insert_conflict_is_the_same_in_both_forms() {
    let cluster = cluster();
    let client = blocking::TransactionClient::connect(cluster.clone(), vec![ENDPOINT]).unwrap();

    let setup = client.begin_optimistic().unwrap();
    setup.put("k", "v").unwrap();
    setup.commit().unwrap();

    let txn = client.begin_optimistic().unwrap();
    txn.insert("k", "again").unwrap();
    let blocking_err = txn.commit().unwrap_err();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let async_err = runtime.block_on(async {
        let client = keyspan::TransactionClient::connect(&cluster, vec![ENDPOINT])
            .await
            .unwrap();
        let mut txn = client.begin_optimistic().await.unwrap();
        txn.insert("k", "again").await.unwrap();
        txn.commit().await.unwrap_err()
    });

    assert_eq!(blocking_err, Error::AlreadyExists { key: key("k") });
    assert_eq!(blocking_err, async_err);
}

#[test]
fn connection_failure() {
    let err = blocking::TransactionClient::connect(MemoryCluster::new(), vec!["mem://gone"]).unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}
