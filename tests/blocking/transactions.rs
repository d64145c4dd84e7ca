//! Blocking transactions and snapshots

use crate::common::*;
use keyspan::blocking::{TransactionClient, Worker};
use keyspan::{BoundRange, DropCheck, Error, Key, KvPair, LockingMode, TransactionState};
use std::time::Duration;

fn client() -> TransactionClient {
    TransactionClient::connect_with_config(cluster(), vec![ENDPOINT], fast_config()).unwrap()
}

#[test]
fn five_keys_then_exclusive_scan() {
    let client = client();
    let txn = client.begin_optimistic().unwrap();
    for (k, v) in [("k1", "v1"), ("k2", "v2"), ("k3", "v3"), ("k4", "v4"), ("k5", "v5")] {
        txn.put(k, v).unwrap();
    }
    assert!(txn.commit().unwrap().is_some());
    assert_eq!(txn.state().unwrap(), TransactionState::Committed);

    let reader = client.begin(false).unwrap();
    let range = BoundRange::new(Some(Key::from("k1")), None, false, false);
    assert_eq!(
        reader.scan(range, 10).unwrap(),
        vec![
            KvPair::new("k2", "v2"),
            KvPair::new("k3", "v3"),
            KvPair::new("k4", "v4"),
            KvPair::new("k5", "v5"),
        ]
    );
    reader.rollback().unwrap();
}

#[test]
fn snapshot_isolation() {
    let client = client();
    let setup = client.begin_optimistic().unwrap();
    setup.put("k", "v1").unwrap();
    setup.commit().unwrap();

    let a = client.begin_optimistic().unwrap();
    let before = client.current_timestamp().unwrap();

    let b = client.begin_optimistic().unwrap();
    b.put("k", "v2").unwrap();
    b.commit().unwrap();

    assert_eq!(a.get("k").unwrap(), Some(b"v1".to_vec()));
    a.rollback().unwrap();

    let snapshot = client.snapshot(before, false);
    assert_eq!(snapshot.timestamp(), before);
    assert_eq!(snapshot.mode(), LockingMode::Optimistic);
    assert_eq!(snapshot.get("k").unwrap(), Some(b"v1".to_vec()));
    assert!(snapshot.key_exists("k").unwrap());
    assert_eq!(snapshot.batch_get(["k"]).unwrap(), vec![KvPair::new("k", "v1")]);
    assert_eq!(snapshot.scan_keys(.., 10).unwrap(), vec![Key::from("k")]);
    assert_eq!(snapshot.scan(.., 10).unwrap().len(), 1);
}

#[test]
fn pessimistic_lock_timeout() {
    let client = client();
    let a = client.begin_pessimistic().unwrap();
    a.lock_keys(["k"]).unwrap();

    let b = client.begin_pessimistic().unwrap();
    assert_eq!(
        b.get_for_update("k"),
        Err(Error::LockTimeout { key: Key::from("k") })
    );
    assert_eq!(b.batch_get_for_update(["k"]), Err(Error::LockTimeout { key: Key::from("k") }));
    b.rollback().unwrap();

    a.delete("k").unwrap();
    assert!(!a.key_exists("k").unwrap());
    a.commit().unwrap();
}

#[test]
fn dropped_pessimistic_transaction_releases_locks() {
    let client = client();
    let a = client.begin_pessimistic().unwrap();
    a.put("k", "a").unwrap();
    drop(a);

    let b = client.begin_pessimistic().unwrap();
    b.put("k", "b").unwrap();
    b.commit().unwrap();
    assert_eq!(client.begin_optimistic().unwrap().batch_get(["k"]).unwrap().len(), 1);
}

#[test]
#[should_panic(expected = "dropped while active")]
fn drop_check_panics_on_the_dropping_thread() {
    let config = fast_config().drop_check(DropCheck::Panic);
    let client = TransactionClient::connect_with_config(cluster(), vec![ENDPOINT], config).unwrap();
    let txn = client.begin_optimistic().unwrap();
    txn.put("k", "v").unwrap();
    drop(txn);
}

#[test]
fn clients_can_share_a_worker() {
    let worker = Worker::start(&fast_config().worker_threads(2)).unwrap();
    let cluster = cluster();
    let txns = TransactionClient::connect_on(worker.clone(), cluster.clone(), vec![ENDPOINT], fast_config()).unwrap();
    let raw = keyspan::blocking::RawClient::connect_on(worker.clone(), cluster, vec![ENDPOINT], fast_config()).unwrap();

    raw.put("raw", "1").unwrap();
    let txn = txns.begin_optimistic().unwrap();
    txn.put("txn", "1").unwrap();
    txn.commit().unwrap();

    assert!(txns.gc(txns.current_timestamp().unwrap()).unwrap());
    assert_eq!(txns.config().lock_wait_duration(), Duration::from_millis(100));

    worker.shutdown();
    assert_eq!(raw.get("raw"), Err(Error::WorkerShutdown));
}
