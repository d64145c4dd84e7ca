//! Blocking transaction client, transactions and snapshots
//!
//! Transaction and snapshot handles allow one call at a time. The engine
//! object sits behind an async mutex that a blocking call claims with
//! `try_lock` before it is queued, so a second call racing the first fails
//! with `Misuse` instead of waiting behind it.

use super::Worker;
use keyspan_core::{BoundRange, Config, Error, Key, KvPair, LockingMode, Result, Timestamp, TransactionState, Value};
use keyspan_driver::Connector;
use keyspan_engine::{
    Snapshot as AsyncSnapshot, Transaction as AsyncTransaction, TransactionClient as AsyncTransactionClient,
};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

fn claim<T>(handle: &Arc<Mutex<T>>, what: &str) -> Result<OwnedMutexGuard<T>> {
    Arc::clone(handle)
        .try_lock_owned()
        .map_err(|_| Error::Misuse(format!("another call on this {} is already in flight", what)))
}

// ============================================================================
// TransactionClient
// ============================================================================

/// Blocking form of [`keyspan_engine::TransactionClient`]
#[derive(Debug, Clone)]
pub struct TransactionClient {
    inner: AsyncTransactionClient,
    worker: Worker,
}

impl TransactionClient {
    /// Connect with the default configuration
    pub fn connect<C, S>(connector: C, endpoints: Vec<S>) -> Result<TransactionClient>
    where
        C: Connector + 'static,
        S: Into<String>,
    {
        Self::connect_with_config(connector, endpoints, Config::default())
    }

    /// Connect with an explicit configuration, starting a new worker
    pub fn connect_with_config<C, S>(connector: C, endpoints: Vec<S>, config: Config) -> Result<TransactionClient>
    where
        C: Connector + 'static,
        S: Into<String>,
    {
        let worker = Worker::start(&config)?;
        Self::connect_on(worker, connector, endpoints, config)
    }

    /// Connect using an existing worker
    pub fn connect_on<C, S>(
        worker: Worker,
        connector: C,
        endpoints: Vec<S>,
        config: Config,
    ) -> Result<TransactionClient>
    where
        C: Connector + 'static,
        S: Into<String>,
    {
        let endpoints: Vec<String> = endpoints.into_iter().map(Into::into).collect();
        let inner = worker.run(async move {
            AsyncTransactionClient::connect_with_config(&connector, endpoints, config).await
        })?;
        Ok(TransactionClient { inner, worker })
    }

    /// Configuration this client was connected with
    pub fn config(&self) -> &Config {
        self.inner.config()
    }

    /// Worker running this client's calls
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    /// Start an optimistic transaction
    pub fn begin_optimistic(&self) -> Result<Transaction> {
        self.begin_with_mode(LockingMode::Optimistic)
    }

    /// Start a pessimistic transaction
    pub fn begin_pessimistic(&self) -> Result<Transaction> {
        self.begin_with_mode(LockingMode::Pessimistic)
    }

    /// Start a transaction, pessimistic if `pessimistic` is set
    pub fn begin(&self, pessimistic: bool) -> Result<Transaction> {
        self.begin_with_mode(LockingMode::from_pessimistic(pessimistic))
    }

    /// Start a transaction in `mode`
    pub fn begin_with_mode(&self, mode: LockingMode) -> Result<Transaction> {
        let client = self.inner.clone();
        let txn = self
            .worker
            .run(async move { client.begin_with_mode(mode).await })?;
        Ok(Transaction {
            start_ts: txn.start_timestamp(),
            mode,
            inner: Some(Arc::new(Mutex::new(txn))),
            worker: self.worker.clone(),
        })
    }

    /// Read-only view at `timestamp`
    pub fn snapshot(&self, timestamp: Timestamp, pessimistic: bool) -> Snapshot {
        Snapshot {
            timestamp,
            mode: LockingMode::from_pessimistic(pessimistic),
            inner: Arc::new(Mutex::new(self.inner.snapshot(timestamp, pessimistic))),
            worker: self.worker.clone(),
        }
    }

    /// Fresh timestamp from the cluster
    pub fn current_timestamp(&self) -> Result<Timestamp> {
        let client = self.inner.clone();
        self.worker.run(async move { client.current_timestamp().await })
    }

    /// Let the cluster drop versions no reader at or after `safepoint` needs
    pub fn gc(&self, safepoint: Timestamp) -> Result<bool> {
        let client = self.inner.clone();
        self.worker.run(async move { client.gc(safepoint).await })
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// Blocking form of [`keyspan_engine::Transaction`]
///
/// Dropping an active transaction runs the engine's drop check on the worker,
/// so pessimistic locks are released there; a panic raised by the check is
/// resumed on the dropping thread.
#[derive(Debug)]
pub struct Transaction {
    start_ts: Timestamp,
    mode: LockingMode,
    /// Taken only by `Drop`
    inner: Option<Arc<Mutex<AsyncTransaction>>>,
    worker: Worker,
}

macro_rules! on_worker {
    ($self:ident, |$txn:ident| $body:expr) => {{
        #[allow(unused_mut)]
        let mut $txn = $self.claim()?;
        $self.worker.run(async move { $body.await })
    }};
}

impl Transaction {
    fn claim(&self) -> Result<OwnedMutexGuard<AsyncTransaction>> {
        let handle = self.inner.as_ref().ok_or(Error::WorkerShutdown)?;
        claim(handle, "transaction")
    }

    /// Read point and identity of this transaction
    pub fn start_timestamp(&self) -> Timestamp {
        self.start_ts
    }

    /// Concurrency control mode
    pub fn mode(&self) -> LockingMode {
        self.mode
    }

    /// Current lifecycle state
    ///
    /// Fails with `Misuse` while another call is in flight.
    pub fn state(&self) -> Result<TransactionState> {
        Ok(self.claim()?.state())
    }

    /// Read `key`, seeing this transaction's writes
    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        on_worker!(self, |txn| txn.get(key))
    }

    /// Lock `key`, then read it
    pub fn get_for_update(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        on_worker!(self, |txn| txn.get_for_update(key))
    }

    /// Check whether `key` exists, seeing this transaction's writes
    pub fn key_exists(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        on_worker!(self, |txn| txn.key_exists(key))
    }

    /// Read several keys; absent keys are left out
    pub fn batch_get(&self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<Vec<KvPair>> {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        on_worker!(self, |txn| txn.batch_get(keys))
    }

    /// Lock several keys, then read them
    pub fn batch_get_for_update(&self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<Vec<KvPair>> {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        on_worker!(self, |txn| txn.batch_get_for_update(keys))
    }

    /// Up to `limit` pairs in `range`, ascending
    pub fn scan(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<KvPair>> {
        let range = range.into();
        on_worker!(self, |txn| txn.scan(range, limit))
    }

    /// Up to `limit` keys in `range`, ascending
    pub fn scan_keys(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<Key>> {
        let range = range.into();
        on_worker!(self, |txn| txn.scan_keys(range, limit))
    }

    /// Set `key` to `value`
    pub fn put(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        on_worker!(self, |txn| txn.put(key, value))
    }

    /// Set `key` to `value`, failing if `key` already exists
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        on_worker!(self, |txn| txn.insert(key, value))
    }

    /// Remove `key`
    pub fn delete(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        on_worker!(self, |txn| txn.delete(key))
    }

    /// Lock keys without changing them
    pub fn lock_keys(&self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<()> {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        on_worker!(self, |txn| txn.lock_keys(keys))
    }

    /// Commit all buffered writes atomically
    pub fn commit(&self) -> Result<Option<Timestamp>> {
        on_worker!(self, |txn| txn.commit())
    }

    /// Discard buffered writes and release pessimistic locks
    pub fn rollback(&self) -> Result<()> {
        on_worker!(self, |txn| txn.rollback())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        // if the worker cannot take it, the closure and the transaction are
        // dropped right here instead
        if let Ok(Err(panic)) = self.worker.run_in_context(move || drop(inner)) {
            if !std::thread::panicking() {
                std::panic::resume_unwind(panic);
            }
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Blocking form of [`keyspan_engine::Snapshot`]
#[derive(Debug)]
pub struct Snapshot {
    timestamp: Timestamp,
    mode: LockingMode,
    inner: Arc<Mutex<AsyncSnapshot>>,
    worker: Worker,
}

impl Snapshot {
    fn claim(&self) -> Result<OwnedMutexGuard<AsyncSnapshot>> {
        claim(&self.inner, "snapshot")
    }

    /// Read point
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Locking mode the snapshot was created with
    pub fn mode(&self) -> LockingMode {
        self.mode
    }

    /// Read one key
    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        on_worker!(self, |snapshot| snapshot.get(key))
    }

    /// Check whether a key exists without fetching its value
    pub fn key_exists(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        on_worker!(self, |snapshot| snapshot.key_exists(key))
    }

    /// Read several keys; absent keys are left out
    pub fn batch_get(&self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<Vec<KvPair>> {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        on_worker!(self, |snapshot| snapshot.batch_get(keys))
    }

    /// Up to `limit` pairs in `range`, ascending
    pub fn scan(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<KvPair>> {
        let range = range.into();
        on_worker!(self, |snapshot| snapshot.scan(range, limit))
    }

    /// Up to `limit` keys in `range`, ascending
    pub fn scan_keys(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<Key>> {
        let range = range.into();
        on_worker!(self, |snapshot| snapshot.scan_keys(range, limit))
    }
}
