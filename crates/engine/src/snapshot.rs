//! Read-only snapshots

use crate::client::with_timeout;
use keyspan_core::{BoundRange, Config, Key, KvPair, LockingMode, Result, Timestamp, Value};
use keyspan_driver::ClusterDriver;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Read-only view of the store at a fixed timestamp
///
/// Sees exactly the versions committed at or before [`timestamp`]. Has no
/// buffer and no terminal operation.
///
/// [`timestamp`]: Snapshot::timestamp
pub struct Snapshot {
    driver: Arc<dyn ClusterDriver>,
    config: Arc<Config>,
    timestamp: Timestamp,
    mode: LockingMode,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("timestamp", &self.timestamp)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Snapshot {
    pub(crate) fn new(
        driver: Arc<dyn ClusterDriver>,
        config: Arc<Config>,
        timestamp: Timestamp,
        mode: LockingMode,
    ) -> Self {
        Snapshot {
            driver,
            config,
            timestamp,
            mode,
        }
    }

    /// Read point
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Locking mode the snapshot was created with
    pub fn mode(&self) -> LockingMode {
        self.mode
    }

    fn deadline(&self) -> Duration {
        self.config.request_timeout_duration()
    }

    /// Read one key
    pub async fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        with_timeout("read", self.deadline(), self.driver.read(&key, self.timestamp)).await
    }

    /// Check whether a key exists without fetching its value
    pub async fn key_exists(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        with_timeout("exists", self.deadline(), self.driver.exists(&key, self.timestamp)).await
    }

    /// Read several keys; absent keys and repeats are left out
    pub async fn batch_get(&self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<Vec<KvPair>> {
        let mut seen = BTreeSet::new();
        let keys: Vec<Key> = keys
            .into_iter()
            .map(Into::into)
            .filter(|key: &Key| seen.insert(key.clone()))
            .collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        with_timeout(
            "batch_read",
            self.deadline(),
            self.driver.batch_read(&keys, self.timestamp),
        )
        .await
    }

    /// Up to `limit` pairs in `range`, ascending
    pub async fn scan(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<KvPair>> {
        self.scan_inner(range.into(), limit, false).await
    }

    /// Up to `limit` keys in `range`, ascending
    pub async fn scan_keys(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<Key>> {
        let pairs = self.scan_inner(range.into(), limit, true).await?;
        Ok(pairs.into_iter().map(KvPair::into_key).collect())
    }

    async fn scan_inner(&self, range: BoundRange, limit: u32, key_only: bool) -> Result<Vec<KvPair>> {
        if limit == 0 || range.is_empty() {
            return Ok(Vec::new());
        }
        with_timeout(
            "scan",
            self.deadline(),
            self.driver.scan(&range, self.timestamp, limit, key_only),
        )
        .await
    }
}
