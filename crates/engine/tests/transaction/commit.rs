//! Two-phase commit outcomes

use crate::common::*;
use std::time::Duration;

#[tokio::test]
async fn five_keys_then_exclusive_scan() {
    let test = TestCluster::new();
    let client = test.txn_client().await;

    let mut txn = client.begin_optimistic().await.unwrap();
    for (k, v) in [("k1", "v1"), ("k2", "v2"), ("k3", "v3"), ("k4", "v4"), ("k5", "v5")] {
        txn.put(k, v).await.unwrap();
    }
    txn.commit().await.unwrap();

    let mut reader = client.begin_optimistic().await.unwrap();
    let range = BoundRange::new(Some(key("k1")), None, false, false);
    assert_eq!(
        reader.scan(range, 10).await.unwrap(),
        vec![pair("k2", "v2"), pair("k3", "v3"), pair("k4", "v4"), pair("k5", "v5")]
    );
    reader.rollback().await.unwrap();
}

#[tokio::test]
async fn empty_commit_returns_no_timestamp() {
    let test = TestCluster::new();
    let client = test.txn_client().await;
    let mut txn = client.begin_optimistic().await.unwrap();
    assert_eq!(txn.commit().await.unwrap(), None);
    assert_eq!(txn.state(), TransactionState::Committed);
}

#[tokio::test]
async fn concurrent_writer_wins_first_commit() {
    let test = TestCluster::new();
    let client = test.txn_client().await;

    let mut a = client.begin_optimistic().await.unwrap();
    let mut b = client.begin_optimistic().await.unwrap();
    a.put("k", "a").await.unwrap();
    b.put("k", "b").await.unwrap();
    b.commit().await.unwrap();

    let result = a.commit().await;
    match result {
        Err(Error::WriteConflict { key: k, start_ts, .. }) => {
            assert_eq!(k, key("k"));
            assert_eq!(start_ts, a.start_timestamp());
        }
        other => panic!("expected write conflict, got {other:?}"),
    }
    assert_eq!(a.state(), TransactionState::Aborted);
    assert_eq!(
        a.get("k").await,
        Err(Error::TransactionClosed {
            state: TransactionState::Aborted
        })
    );

    let mut reader = client.begin_optimistic().await.unwrap();
    assert_eq!(reader.get("k").await.unwrap(), Some(b"b".to_vec()));
    reader.rollback().await.unwrap();
}

#[tokio::test]
async fn insert_of_existing_key_aborts() {
    let test = TestCluster::new();
    let client = test.txn_client().await;

    let mut setup = client.begin_optimistic().await.unwrap();
    setup.put("user:1", "alice").await.unwrap();
    setup.commit().await.unwrap();

    let mut txn = client.begin_optimistic().await.unwrap();
    txn.insert("user:1", "mallory").await.unwrap();
    txn.put("user:2", "bob").await.unwrap();
    assert_eq!(
        txn.commit().await,
        Err(Error::AlreadyExists { key: key("user:1") })
    );
    assert_eq!(txn.state(), TransactionState::Aborted);

    let mut reader = client.begin_optimistic().await.unwrap();
    assert_eq!(reader.get("user:1").await.unwrap(), Some(b"alice".to_vec()));
    assert_eq!(reader.get("user:2").await.unwrap(), None);
    reader.rollback().await.unwrap();
}

#[tokio::test]
async fn failed_primary_commit_releases_everything() {
    let test = TestCluster::new();
    let client = test.txn_client().await;

    let mut txn = client.begin_optimistic().await.unwrap();
    txn.put("a", "1").await.unwrap();
    txn.put("b", "2").await.unwrap();
    test.cluster
        .fail_next("commit", Error::StoreUnavailable("leader changed".into()));
    assert_eq!(
        txn.commit().await,
        Err(Error::StoreUnavailable("leader changed".into()))
    );
    assert_eq!(txn.state(), TransactionState::Aborted);

    // the locks are gone, so a later writer is not blocked
    let mut next = client.begin_optimistic().await.unwrap();
    assert!(next.batch_get(["a", "b"]).await.unwrap().is_empty());
    next.put("a", "x").await.unwrap();
    next.commit().await.unwrap();
}

#[tokio::test]
async fn failed_prewrite_aborts() {
    let test = TestCluster::new();
    let client = test.txn_client().await;

    let mut txn = client.begin_optimistic().await.unwrap();
    txn.put("a", "1").await.unwrap();
    test.cluster
        .fail_next("prewrite", Error::StoreUnavailable("disk full".into()));
    assert!(txn.commit().await.is_err());
    assert_eq!(txn.state(), TransactionState::Aborted);
}

#[tokio::test]
async fn secondary_failure_still_commits() {
    let test = TestCluster::new();
    let client = test.txn_client().await;

    let mut txn = client.begin_optimistic().await.unwrap();
    txn.put("a", "1").await.unwrap();
    txn.put("b", "2").await.unwrap();
    txn.put("c", "3").await.unwrap();
    test.cluster
        .fail_nth("commit", 1, Error::StoreUnavailable("dropped".into()));
    assert!(txn.commit().await.unwrap().is_some());
    assert_eq!(txn.state(), TransactionState::Committed);

    // secondaries are rolled forward from the committed primary
    let mut reader = client.begin_optimistic().await.unwrap();
    assert_eq!(
        reader.scan(.., 10).await.unwrap(),
        vec![pair("a", "1"), pair("b", "2"), pair("c", "3")]
    );
    reader.rollback().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn slow_rpc_times_out_and_keeps_transaction_active() {
    let test = TestCluster::new();
    let client = test.txn_client().await;

    let mut txn = client.begin_optimistic().await.unwrap();
    test.cluster.set_rpc_delay(Some(Duration::from_secs(5)));
    assert_eq!(
        txn.get("k").await,
        Err(Error::Timeout {
            operation: "read",
            after: Duration::from_millis(500)
        })
    );
    assert_eq!(txn.state(), TransactionState::Active);

    test.cluster.set_rpc_delay(None);
    assert_eq!(txn.get("k").await.unwrap(), None);
    txn.put("k", "v").await.unwrap();
    assert!(txn.commit().await.unwrap().is_some());
}

#[tokio::test]
async fn cancelled_commit_runs_to_completion() {
    let test = TestCluster::new();
    let client = test.txn_client().await;

    let mut txn = client.begin_optimistic().await.unwrap();
    txn.put("j", "w").await.unwrap();
    txn.put("k", "v").await.unwrap();

    test.cluster.set_rpc_delay(Some(Duration::from_millis(100)));
    let cancelled = tokio::time::timeout(Duration::from_millis(150), txn.commit()).await;
    assert!(cancelled.is_err());
    test.cluster.set_rpc_delay(None);

    let committing = Err(Error::TransactionClosed {
        state: TransactionState::Committing,
    });
    assert_eq!(txn.state(), TransactionState::Committing);
    assert_eq!(txn.rollback().await, committing.clone());
    assert_eq!(txn.get("k").await, committing.map(|()| None));

    // calling commit again collects the outcome
    assert!(txn.commit().await.unwrap().is_some());
    assert_eq!(txn.state(), TransactionState::Committed);

    let mut reader = client.begin_optimistic().await.unwrap();
    assert_eq!(
        reader.batch_get(["j", "k"]).await.unwrap(),
        vec![pair("j", "w"), pair("k", "v")]
    );
    reader.rollback().await.unwrap();
}

#[tokio::test]
async fn dropping_a_cancelled_commit_leaves_no_locks() {
    let test = TestCluster::new();
    let client = test.txn_client().await;

    let mut txn = client.begin_optimistic().await.unwrap();
    txn.put("k", "v").await.unwrap();

    test.cluster.set_rpc_delay(Some(Duration::from_millis(100)));
    let cancelled = tokio::time::timeout(Duration::from_millis(50), txn.commit()).await;
    assert!(cancelled.is_err());
    test.cluster.set_rpc_delay(None);
    drop(txn);

    // give the detached commit time to land
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut next = client.begin_optimistic().await.unwrap();
    assert_eq!(next.get("k").await.unwrap(), Some(b"v".to_vec()));
    next.put("k", "v2").await.unwrap();
    assert!(next.commit().await.unwrap().is_some());
}

#[tokio::test]
async fn gc_keeps_secondaries_of_a_committed_transaction() {
    let test = TestCluster::new();
    let client = test.txn_client().await;

    let mut first = client.begin_optimistic().await.unwrap();
    first.put("p", "p1").await.unwrap();
    first.put("s", "s1").await.unwrap();
    test.cluster
        .fail_nth("commit", 1, Error::StoreUnavailable("dropped".into()));
    assert!(first.commit().await.unwrap().is_some());

    let mut second = client.begin_optimistic().await.unwrap();
    second.put("p", "p2").await.unwrap();
    second.commit().await.unwrap();

    let safepoint = client.current_timestamp().await.unwrap();
    assert!(client.gc(safepoint).await.unwrap());

    let mut reader = client.begin_optimistic().await.unwrap();
    assert_eq!(reader.get("s").await.unwrap(), Some(b"s1".to_vec()));
    assert_eq!(reader.get("p").await.unwrap(), Some(b"p2".to_vec()));
    reader.rollback().await.unwrap();
}
