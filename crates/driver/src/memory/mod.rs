//! In-process cluster
//!
//! [`MemoryCluster`] keeps a multi-version transactional keyspace and a raw
//! keyspace behind one timestamp oracle. It behaves like a single-region
//! cluster: prewrite/commit/rollback follow the percolator protocol, readers
//! that hit a prewrite lock resolve it through its primary or wait for it,
//! and pessimistic lock requests queue until the holder releases or the wait
//! runs out.
//!
//! Clones share state. Register addresses with [`MemoryCluster::serve`] so a
//! client can reach the cluster through [`Connector`].
//!
//! Failure injection for tests:
//! - [`MemoryCluster::fail_next`] / [`MemoryCluster::fail_nth`] make a named
//!   RPC return an error once
//! - [`MemoryCluster::set_rpc_delay`] delays every RPC

mod mvcc;
mod raw;

use crate::{ClusterDriver, Connector, RawDriver};
use async_trait::async_trait;
use keyspan_core::{
    BoundRange, ColumnFamily, Error, Key, KvPair, Mutation, Result, Timestamp, Value,
};
use mvcc::{Blocked, MvccStore, Resolution};
use parking_lot::Mutex;
use raw::RawStore;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

/// How long a reader waits on a lock whose owner has not committed its primary
const DEFAULT_READ_LOCK_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct Fault {
    skip: usize,
    error: Error,
}

#[derive(Debug)]
struct Shared {
    mvcc: Mutex<MvccStore>,
    raw: Mutex<RawStore>,
    /// Woken whenever a lock is committed, rolled back or resolved
    lock_released: Notify,
    tso: AtomicU64,
    gc_safepoint: AtomicU64,
    endpoints: Mutex<HashSet<String>>,
    faults: Mutex<HashMap<&'static str, Fault>>,
    rpc_delay: Mutex<Option<Duration>>,
    read_lock_wait: Mutex<Duration>,
}

/// In-process MVCC cluster
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    shared: Arc<Shared>,
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCluster {
    /// Empty cluster with no registered endpoints
    pub fn new() -> Self {
        MemoryCluster {
            shared: Arc::new(Shared {
                mvcc: Mutex::new(MvccStore::new()),
                raw: Mutex::new(RawStore::new()),
                lock_released: Notify::new(),
                tso: AtomicU64::new(0),
                gc_safepoint: AtomicU64::new(0),
                endpoints: Mutex::new(HashSet::new()),
                faults: Mutex::new(HashMap::new()),
                rpc_delay: Mutex::new(None),
                read_lock_wait: Mutex::new(DEFAULT_READ_LOCK_WAIT),
            }),
        }
    }

    /// Builder form of [`serve`](Self::serve)
    pub fn with_endpoint(self, addr: impl Into<String>) -> Self {
        self.serve(addr);
        self
    }

    /// Accept connections at `addr`
    pub fn serve(&self, addr: impl Into<String>) {
        self.shared.endpoints.lock().insert(addr.into());
    }

    /// Stop accepting connections at `addr`
    ///
    /// Drivers already connected keep working.
    pub fn shutdown(&self, addr: &str) {
        self.shared.endpoints.lock().remove(addr);
    }

    /// Make the next call of RPC `op` fail with `error`
    ///
    /// `op` is the driver method name, e.g. `"prewrite"` or `"raw_put"`.
    pub fn fail_next(&self, op: &'static str, error: Error) {
        self.fail_nth(op, 0, error);
    }

    /// Let `skip` calls of `op` through, then fail the next one with `error`
    pub fn fail_nth(&self, op: &'static str, skip: usize, error: Error) {
        self.shared.faults.lock().insert(op, Fault { skip, error });
    }

    /// Delay every RPC by `delay`; `None` removes the delay
    pub fn set_rpc_delay(&self, delay: Option<Duration>) {
        *self.shared.rpc_delay.lock() = delay;
    }

    /// How long a reader waits on an unresolved prewrite lock
    pub fn set_read_lock_wait(&self, wait: Duration) {
        *self.shared.read_lock_wait.lock() = wait;
    }

    /// Largest timestamp handed out so far
    pub fn latest_timestamp(&self) -> Timestamp {
        Timestamp::from_version(self.shared.tso.load(Ordering::SeqCst))
    }

    async fn rpc(&self, op: &'static str) -> Result<()> {
        let delay = *self.shared.rpc_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fault = self.take_fault(op);
        match fault {
            Some(error) => {
                debug!(op, %error, "injected fault");
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn take_fault(&self, op: &'static str) -> Option<Error> {
        let mut faults = self.shared.faults.lock();
        let fault = faults.get_mut(op)?;
        if fault.skip > 0 {
            fault.skip -= 1;
            return None;
        }
        faults.remove(op).map(|f| f.error)
    }

    fn next_timestamp(&self) -> Timestamp {
        Timestamp::from_version(self.shared.tso.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Run `read` against the MVCC store, resolving locks that block it
    async fn read_resolving<T, F>(&self, read: F) -> Result<T>
    where
        F: Fn(&MvccStore) -> std::result::Result<T, Blocked> + Send + Sync,
        T: Send,
    {
        let wait = *self.shared.read_lock_wait.lock();
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.shared.lock_released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let pending = {
                let mut mvcc = self.shared.mvcc.lock();
                let outcome = read(&mvcc);
                match outcome {
                    Ok(found) => return Ok(found),
                    Err(Blocked { key }) => match mvcc.resolve(&key) {
                        Resolution::Pending => key,
                        resolution => {
                            trace!(%key, ?resolution, "resolved lock");
                            self.shared.lock_released.notify_waiters();
                            continue;
                        }
                    },
                }
            };

            debug!(key = %pending, "read blocked on pending lock");
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Error::StoreUnavailable(format!(
                    "key {} is locked by an uncommitted transaction",
                    pending
                )));
            }
        }
    }
}

#[async_trait]
impl ClusterDriver for MemoryCluster {
    async fn get_timestamp(&self) -> Result<Timestamp> {
        self.rpc("get_timestamp").await?;
        Ok(self.next_timestamp())
    }

    async fn read(&self, key: &Key, ts: Timestamp) -> Result<Option<Value>> {
        self.rpc("read").await?;
        self.read_resolving(|mvcc| mvcc.get(key, ts)).await
    }

    async fn exists(&self, key: &Key, ts: Timestamp) -> Result<bool> {
        self.rpc("exists").await?;
        self.read_resolving(|mvcc| mvcc.exists(key, ts)).await
    }

    async fn batch_read(&self, keys: &[Key], ts: Timestamp) -> Result<Vec<KvPair>> {
        self.rpc("batch_read").await?;
        self.read_resolving(|mvcc| {
            let mut pairs = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(value) = mvcc.get(key, ts)? {
                    pairs.push(KvPair(key.clone(), value));
                }
            }
            Ok(pairs)
        })
        .await
    }

    async fn scan(
        &self,
        range: &BoundRange,
        ts: Timestamp,
        limit: u32,
        key_only: bool,
    ) -> Result<Vec<KvPair>> {
        self.rpc("scan").await?;
        self.read_resolving(|mvcc| mvcc.scan(range, ts, limit, key_only))
            .await
    }

    async fn prewrite(&self, mutations: &[Mutation], primary: &Key, start_ts: Timestamp) -> Result<()> {
        self.rpc("prewrite").await?;
        let result = self.shared.mvcc.lock().prewrite(mutations, primary, start_ts);
        trace!(%start_ts, mutations = mutations.len(), ok = result.is_ok(), "prewrite");
        result
    }

    async fn commit(&self, keys: &[Key], start_ts: Timestamp, commit_ts: Timestamp) -> Result<()> {
        self.rpc("commit").await?;
        let result = self.shared.mvcc.lock().commit(keys, start_ts, commit_ts);
        self.shared.lock_released.notify_waiters();
        result
    }

    async fn rollback(&self, keys: &[Key], start_ts: Timestamp) -> Result<()> {
        self.rpc("rollback").await?;
        self.shared.mvcc.lock().rollback(keys, start_ts);
        self.shared.lock_released.notify_waiters();
        Ok(())
    }

    async fn acquire_pessimistic_lock(
        &self,
        keys: &[Key],
        primary: &Key,
        start_ts: Timestamp,
        for_update_ts: Timestamp,
        wait: Duration,
    ) -> Result<()> {
        self.rpc("acquire_pessimistic_lock").await?;
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.shared.lock_released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let held = self
                .shared
                .mvcc
                .lock()
                .try_lock_pessimistic(keys, primary, start_ts, for_update_ts)?;
            let Some(key) = held else {
                return Ok(());
            };

            debug!(%start_ts, %key, "waiting for pessimistic lock");
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(Error::LockTimeout { key });
            }
        }
    }

    async fn gc(&self, safepoint: Timestamp) -> Result<bool> {
        self.rpc("gc").await?;
        let previous = self
            .shared
            .gc_safepoint
            .fetch_max(safepoint.version(), Ordering::SeqCst);
        if safepoint.version() <= previous {
            return Ok(false);
        }
        let dropped = self.shared.mvcc.lock().gc(safepoint);
        debug!(%safepoint, dropped, "gc");
        Ok(true)
    }
}

#[async_trait]
impl RawDriver for MemoryCluster {
    async fn raw_get(&self, cf: ColumnFamily, key: &Key) -> Result<Option<Value>> {
        self.rpc("raw_get").await?;
        Ok(self.shared.raw.lock().get(cf, key, Instant::now()))
    }

    async fn raw_batch_get(&self, cf: ColumnFamily, keys: &[Key]) -> Result<Vec<KvPair>> {
        self.rpc("raw_batch_get").await?;
        let now = Instant::now();
        let raw = self.shared.raw.lock();
        Ok(keys
            .iter()
            .filter_map(|key| raw.get(cf, key, now).map(|value| KvPair(key.clone(), value)))
            .collect())
    }

    async fn raw_put(&self, cf: ColumnFamily, pair: KvPair, ttl_secs: Option<u64>) -> Result<()> {
        self.rpc("raw_put").await?;
        let KvPair(key, value) = pair;
        self.shared
            .raw
            .lock()
            .put(cf, key, value, ttl_secs, Instant::now());
        Ok(())
    }

    async fn raw_batch_put(&self, cf: ColumnFamily, pairs: Vec<(KvPair, Option<u64>)>) -> Result<()> {
        self.rpc("raw_batch_put").await?;
        let now = Instant::now();
        let mut raw = self.shared.raw.lock();
        for (KvPair(key, value), ttl_secs) in pairs {
            raw.put(cf, key, value, ttl_secs, now);
        }
        Ok(())
    }

    async fn raw_delete(&self, cf: ColumnFamily, key: &Key) -> Result<()> {
        self.rpc("raw_delete").await?;
        self.shared.raw.lock().delete(cf, key, Instant::now());
        Ok(())
    }

    async fn raw_batch_delete(&self, cf: ColumnFamily, keys: &[Key]) -> Result<()> {
        self.rpc("raw_batch_delete").await?;
        let now = Instant::now();
        let mut raw = self.shared.raw.lock();
        for key in keys {
            raw.delete(cf, key, now);
        }
        Ok(())
    }

    async fn raw_delete_range(&self, cf: ColumnFamily, range: &BoundRange) -> Result<()> {
        self.rpc("raw_delete_range").await?;
        self.shared
            .raw
            .lock()
            .delete_range(cf, range, Instant::now());
        Ok(())
    }

    async fn raw_scan(
        &self,
        cf: ColumnFamily,
        range: &BoundRange,
        limit: u32,
        key_only: bool,
    ) -> Result<Vec<KvPair>> {
        self.rpc("raw_scan").await?;
        Ok(self
            .shared
            .raw
            .lock()
            .scan(cf, range, limit, key_only, Instant::now()))
    }

    async fn raw_get_key_ttl(&self, cf: ColumnFamily, key: &Key) -> Result<Option<u64>> {
        self.rpc("raw_get_key_ttl").await?;
        Ok(self.shared.raw.lock().ttl_secs(cf, key, Instant::now()))
    }
}

#[async_trait]
impl Connector for MemoryCluster {
    type Driver = MemoryCluster;

    async fn connect(&self, endpoint: &str) -> Result<Arc<MemoryCluster>> {
        self.rpc("connect").await?;
        if !self.shared.endpoints.lock().contains(endpoint) {
            return Err(Error::Connection(format!(
                "no cluster listening at {}",
                endpoint
            )));
        }
        Ok(Arc::new(self.clone()))
    }
}
