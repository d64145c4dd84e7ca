//! Scan ordering and bounds

use crate::common::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

#[tokio::test]
async fn scan_honors_inclusivity() {
    let test = TestCluster::new();
    let raw = test.raw().await;
    raw.batch_put(["k1", "k2", "k3", "k4"].map(|k| pair(k, k)))
        .await
        .unwrap();

    let both = BoundRange::new(Some(key("k1")), Some(key("k3")), true, true);
    assert_eq!(
        raw.scan_keys(both, 10).await.unwrap(),
        vec![key("k1"), key("k2"), key("k3")]
    );

    let neither = BoundRange::new(Some(key("k1")), Some(key("k3")), false, false);
    assert_eq!(raw.scan_keys(neither, 10).await.unwrap(), vec![key("k2")]);

    let open_end = BoundRange::new(Some(key("k2")), None, true, false);
    assert_eq!(raw.scan(open_end, 2).await.unwrap(), vec![pair("k2", "k2"), pair("k3", "k3")]);
}

#[tokio::test]
async fn scan_keys_returns_no_values() {
    let test = TestCluster::new();
    let raw = test.raw().await;
    raw.put("a", "1").await.unwrap();
    assert_eq!(raw.scan_keys(.., 10).await.unwrap(), vec![key("a")]);
}

#[tokio::test]
async fn inverted_range_is_empty() {
    let test = TestCluster::new();
    let raw = test.raw().await;
    raw.put("a", "1").await.unwrap();
    let range = BoundRange::new(Some(key("z")), Some(key("a")), true, true);
    assert!(raw.scan(range, 10).await.unwrap().is_empty());
}

fn scan_case() -> impl Strategy<Value = (BTreeSet<Vec<u8>>, Vec<u8>, Vec<u8>, bool, bool, u32)> {
    (
        prop::collection::btree_set(prop::collection::vec(0u8..4, 1..4), 0..24),
        prop::collection::vec(0u8..4, 0..4),
        prop::collection::vec(0u8..4, 0..4),
        any::<bool>(),
        any::<bool>(),
        1u32..32,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scan_is_ordered_bounded_and_complete(
        (keys, start, end, include_start, include_end, limit) in scan_case()
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let (got, expected) = runtime.block_on(async {
            let test = TestCluster::new();
            let raw = test.raw().await;
            raw.batch_put(keys.iter().map(|k| KvPair::new(k.clone(), k.clone())))
                .await
                .unwrap();

            let range = BoundRange::new(
                Some(Key::from(start.clone())),
                Some(Key::from(end.clone())),
                include_start,
                include_end,
            );
            let got = raw.scan_keys(range.clone(), limit).await.unwrap();
            let expected: Vec<Key> = keys
                .iter()
                .map(|k| Key::from(k.clone()))
                .filter(|k| range.contains(k))
                .take(limit as usize)
                .collect();
            (got, expected)
        });

        prop_assert!(got.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(got.len() <= limit as usize);
        prop_assert_eq!(got, expected);
    }
}
