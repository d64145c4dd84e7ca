//! Calls the blocking API refuses

use crate::common::*;
use keyspan::blocking::TransactionClient;
use keyspan::Error;
use std::time::Duration;

#[test]
fn blocking_call_inside_runtime_is_rejected() {
    let cluster = cluster();
    let client = TransactionClient::connect(cluster, vec![ENDPOINT]).unwrap();
    let txn = client.begin_optimistic().unwrap();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let err = runtime.block_on(async { txn.get("k") }).unwrap_err();
    assert!(matches!(err, Error::Misuse(_)));
    let err = runtime.block_on(async { client.current_timestamp() }).unwrap_err();
    assert!(matches!(err, Error::Misuse(_)));

    // the rejected call left the handle usable
    assert_eq!(txn.get("k").unwrap(), None);
    txn.rollback().unwrap();
}

#[test]
fn concurrent_calls_on_one_transaction_are_rejected() {
    let cluster = cluster();
    let client = TransactionClient::connect_with_config(cluster.clone(), vec![ENDPOINT], fast_config()).unwrap();
    let txn = client.begin_optimistic().unwrap();

    cluster.set_rpc_delay(Some(Duration::from_millis(300)));
    std::thread::scope(|scope| {
        let slow = scope.spawn(|| txn.get("k"));
        std::thread::sleep(Duration::from_millis(50));
        let err = txn.put("k", "v").unwrap_err();
        assert!(matches!(err, Error::Misuse(_)));
        assert_eq!(slow.join().unwrap(), Ok(None));
    });
    cluster.set_rpc_delay(None);

    txn.put("k", "v").unwrap();
    txn.commit().unwrap();
}

#[test]
fn concurrent_calls_on_one_snapshot_are_rejected() {
    let cluster = cluster();
    let client = TransactionClient::connect_with_config(cluster.clone(), vec![ENDPOINT], fast_config()).unwrap();
    let snapshot = client.snapshot(client.current_timestamp().unwrap(), false);

    cluster.set_rpc_delay(Some(Duration::from_millis(300)));
    std::thread::scope(|scope| {
        let slow = scope.spawn(|| snapshot.get("k"));
        std::thread::sleep(Duration::from_millis(50));
        assert!(matches!(snapshot.key_exists("k"), Err(Error::Misuse(_))));
        assert_eq!(slow.join().unwrap(), Ok(None));
    });
}

#[test]
fn closed_transaction_error_matches_engine() {
    let client = TransactionClient::connect(cluster(), vec![ENDPOINT]).unwrap();
    let txn = client.begin_optimistic().unwrap();
    txn.rollback().unwrap();
    assert_eq!(
        txn.put("k", "v"),
        Err(Error::TransactionClosed {
            state: keyspan::TransactionState::RolledBack
        })
    );
}
