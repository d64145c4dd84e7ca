//! Transactions
//!
//! A [`Transaction`] reads at its start timestamp and buffers writes locally
//! until [`commit`](Transaction::commit), which runs two-phase commit:
//!
//! ```text
//! 1. state := Committing
//! 2. prewrite every mutation at start_ts, naming the primary key
//! 3. commit_ts := fresh timestamp
//! 4. commit the primary            <- the transaction is committed here
//! 5. commit the secondaries        (failures only logged; readers roll
//!                                   them forward from the primary)
//! ```
//!
//! A failure before step 4 rolls back every lock the transaction holds and
//! leaves it `Aborted`.
//!
//! In pessimistic mode every write, `get_for_update` and `lock_keys` first
//! locks its keys on the cluster, waiting up to the configured lock wait.
//! The first key locked becomes the primary.
//!
//! # Cancellation
//!
//! Dropping a pending call never leaves a half-applied buffer change: the
//! buffer is touched only after the last await. Dropping a pending lock
//! request marks the transaction so every later call except
//! [`rollback`](Transaction::rollback) fails with `LockCancelled`.
//!
//! A commit runs as a spawned task, so dropping a pending
//! [`commit`](Transaction::commit) does not stop it. The transaction stays
//! `Committing` until `commit` is called again to collect the outcome.

mod buffer;
mod commit;

use crate::client::with_timeout;
use buffer::{Buffer, Lookup};
use commit::CommitJob;
use keyspan_core::{
    BoundRange, Config, DropCheck, Error, Key, KvPair, LockingMode, Result, Timestamp,
    TransactionState, Value,
};
use keyspan_driver::ClusterDriver;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Lock attempts before a pessimistic write conflict is reported
///
/// A conflict after waiting means the previous holder committed; the retry
/// uses a fresh `for_update_ts` that sees its write.
const MAX_LOCK_ATTEMPTS: usize = 3;

/// A snapshot-isolated transaction
///
/// Obtained from [`TransactionClient`](crate::TransactionClient). Must end
/// with [`commit`](Self::commit) or [`rollback`](Self::rollback); dropping
/// it while active is reported according to [`Config::drop_check`].
pub struct Transaction {
    driver: Arc<dyn ClusterDriver>,
    config: Arc<Config>,
    start_ts: Timestamp,
    mode: LockingMode,
    state: TransactionState,
    buffer: Buffer,
    /// Keys holding a granted pessimistic lock
    locked: BTreeSet<Key>,
    /// Keys sent in a lock request that has not been confirmed
    pending_locks: BTreeSet<Key>,
    lock_in_flight: bool,
    primary: Option<Key>,
    /// Two-phase commit whose outcome has not been collected yet
    committing: Option<JoinHandle<Result<Timestamp>>>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("start_ts", &self.start_ts)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("locked", &self.locked.len())
            .finish_non_exhaustive()
    }
}

impl Transaction {
    pub(crate) fn new(
        driver: Arc<dyn ClusterDriver>,
        config: Arc<Config>,
        start_ts: Timestamp,
        mode: LockingMode,
    ) -> Self {
        debug!(%start_ts, ?mode, "begin transaction");
        Transaction {
            driver,
            config,
            start_ts,
            mode,
            state: TransactionState::Active,
            buffer: Buffer::new(),
            locked: BTreeSet::new(),
            pending_locks: BTreeSet::new(),
            lock_in_flight: false,
            primary: None,
            committing: None,
        }
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
    pub fn state(&self) -> TransactionState {
        self.state
    }

    fn check_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::TransactionClosed { state: self.state });
        }
        if self.lock_in_flight {
            return Err(Error::LockCancelled);
        }
        Ok(())
    }

    fn deadline(&self) -> Duration {
        self.config.request_timeout_duration()
    }

    async fn timestamp(&self) -> Result<Timestamp> {
        with_timeout("get_timestamp", self.deadline(), self.driver.get_timestamp()).await
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read `key` as of the start timestamp, seeing this transaction's writes
    pub async fn get(&mut self, key: impl Into<Key>) -> Result<Option<Value>> {
        self.check_active()?;
        let key = key.into();
        self.read_at(key, self.start_ts).await
    }

    async fn read_at(&self, key: Key, ts: Timestamp) -> Result<Option<Value>> {
        match self.buffer.lookup(&key) {
            Lookup::Value(value) => Ok(Some(value)),
            Lookup::Deleted => Ok(None),
            Lookup::Miss => with_timeout("read", self.deadline(), self.driver.read(&key, ts)).await,
        }
    }

    /// Check whether `key` exists, seeing this transaction's writes
    pub async fn key_exists(&mut self, key: impl Into<Key>) -> Result<bool> {
        self.check_active()?;
        let key = key.into();
        match self.buffer.lookup(&key) {
            Lookup::Value(_) => Ok(true),
            Lookup::Deleted => Ok(false),
            Lookup::Miss => {
                with_timeout("exists", self.deadline(), self.driver.exists(&key, self.start_ts)).await
            }
        }
    }

    /// Read several keys; absent keys are left out, order follows `keys`
    pub async fn batch_get(&mut self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<Vec<KvPair>> {
        self.check_active()?;
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        self.batch_read_at(keys, self.start_ts).await
    }

    async fn batch_read_at(&self, keys: Vec<Key>, ts: Timestamp) -> Result<Vec<KvPair>> {
        let misses: Vec<Key> = keys
            .iter()
            .filter(|key| self.buffer.lookup(key) == Lookup::Miss)
            .cloned()
            .collect();
        let mut fetched: HashMap<Key, Value> = if misses.is_empty() {
            HashMap::new()
        } else {
            with_timeout("batch_read", self.deadline(), self.driver.batch_read(&misses, ts))
                .await?
                .into_iter()
                .map(|KvPair(k, v)| (k, v))
                .collect()
        };

        let mut seen = BTreeSet::new();
        let mut pairs = Vec::new();
        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            let value = match self.buffer.lookup(&key) {
                Lookup::Value(value) => Some(value),
                Lookup::Deleted => None,
                Lookup::Miss => fetched.remove(&key),
            };
            if let Some(value) = value {
                pairs.push(KvPair(key, value));
            }
        }
        Ok(pairs)
    }

    /// Up to `limit` pairs in `range`, ascending, seeing this transaction's
    /// writes
    pub async fn scan(&mut self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<KvPair>> {
        self.check_active()?;
        self.scan_inner(range.into(), limit, false).await
    }

    /// Up to `limit` keys in `range`, ascending
    pub async fn scan_keys(&mut self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<Key>> {
        self.check_active()?;
        let pairs = self.scan_inner(range.into(), limit, true).await?;
        Ok(pairs.into_iter().map(KvPair::into_key).collect())
    }

    async fn scan_inner(&self, range: BoundRange, limit: u32, key_only: bool) -> Result<Vec<KvPair>> {
        if limit == 0 || range.is_empty() {
            return Ok(Vec::new());
        }
        let hidden = u32::try_from(self.buffer.deletes_in(&range)).unwrap_or(u32::MAX);
        let fetch = limit.saturating_add(hidden);
        let fetched = with_timeout(
            "scan",
            self.deadline(),
            self.driver.scan(&range, self.start_ts, fetch, key_only),
        )
        .await?;
        Ok(self.buffer.merge_scan(&range, fetched, limit, key_only))
    }

    /// Lock `key`, then read it
    ///
    /// Pessimistic: the read is at the lock's `for_update_ts`, so it returns
    /// the latest committed value. Optimistic: the lock is checked at commit
    /// and the read is at the start timestamp.
    pub async fn get_for_update(&mut self, key: impl Into<Key>) -> Result<Option<Value>> {
        self.check_active()?;
        let key = key.into();
        match self.mode {
            LockingMode::Pessimistic => {
                let for_update_ts = self.acquire_locks(vec![key.clone()]).await?;
                self.read_at(key, for_update_ts).await
            }
            LockingMode::Optimistic => {
                let value = self.read_at(key.clone(), self.start_ts).await?;
                self.buffer.lock(key);
                Ok(value)
            }
        }
    }

    /// Lock several keys, then read them
    pub async fn batch_get_for_update(
        &mut self,
        keys: impl IntoIterator<Item = impl Into<Key>>,
    ) -> Result<Vec<KvPair>> {
        self.check_active()?;
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        match self.mode {
            LockingMode::Pessimistic => {
                let for_update_ts = self.acquire_locks(keys.clone()).await?;
                self.batch_read_at(keys, for_update_ts).await
            }
            LockingMode::Optimistic => {
                let pairs = self.batch_read_at(keys.clone(), self.start_ts).await?;
                for key in keys {
                    self.buffer.lock(key);
                }
                Ok(pairs)
            }
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Set `key` to `value`
    pub async fn put(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.check_active()?;
        let key = key.into();
        self.lock_if_pessimistic(&key).await?;
        self.buffer.put(key, value.into());
        Ok(())
    }

    /// Set `key` to `value`, failing if `key` already exists
    ///
    /// A key this transaction already wrote fails immediately; a key that
    /// exists in the store fails the commit with `AlreadyExists`.
    pub async fn insert(&mut self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.check_active()?;
        let key = key.into();
        self.buffer.check_insert(&key)?;
        self.lock_if_pessimistic(&key).await?;
        self.buffer.insert(key, value.into())
    }

    /// Remove `key`
    pub async fn delete(&mut self, key: impl Into<Key>) -> Result<()> {
        self.check_active()?;
        let key = key.into();
        self.lock_if_pessimistic(&key).await?;
        self.buffer.delete(key);
        Ok(())
    }

    /// Lock keys without changing them
    ///
    /// Another transaction writing any of them conflicts with this one.
    pub async fn lock_keys(&mut self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<()> {
        self.check_active()?;
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Ok(());
        }
        match self.mode {
            LockingMode::Pessimistic => {
                self.acquire_locks(keys).await?;
            }
            LockingMode::Optimistic => {
                for key in keys {
                    self.buffer.lock(key);
                }
            }
        }
        Ok(())
    }

    async fn lock_if_pessimistic(&mut self, key: &Key) -> Result<()> {
        if self.mode.is_pessimistic() {
            self.acquire_locks(vec![key.clone()]).await?;
        }
        Ok(())
    }

    /// Take pessimistic locks on `keys`, returning the `for_update_ts` they
    /// were granted at
    async fn acquire_locks(&mut self, mut keys: Vec<Key>) -> Result<Timestamp> {
        keys.sort();
        keys.dedup();
        let primary = match &self.primary {
            Some(primary) => primary.clone(),
            None => keys[0].clone(),
        };

        self.pending_locks.extend(keys.iter().cloned());
        self.lock_in_flight = true;
        let granted = self.request_locks(&keys, &primary).await;
        self.lock_in_flight = false;

        let for_update_ts = match granted {
            Ok(ts) => ts,
            Err(e) => {
                // these outcomes guarantee nothing was granted
                if matches!(e, Error::LockTimeout { .. } | Error::WriteConflict { .. }) {
                    for key in &keys {
                        self.pending_locks.remove(key);
                    }
                }
                return Err(e);
            }
        };
        for key in &keys {
            self.pending_locks.remove(key);
        }
        self.locked.extend(keys);
        self.primary.get_or_insert(primary);
        Ok(for_update_ts)
    }

    async fn request_locks(&self, keys: &[Key], primary: &Key) -> Result<Timestamp> {
        let wait = self.config.lock_wait_duration();
        let deadline = self.deadline() + wait;
        let mut attempt = 1;
        loop {
            let for_update_ts = self.timestamp().await?;
            let result = with_timeout(
                "acquire_pessimistic_lock",
                deadline,
                self.driver
                    .acquire_pessimistic_lock(keys, primary, self.start_ts, for_update_ts, wait),
            )
            .await;
            match result {
                Ok(()) => return Ok(for_update_ts),
                Err(e) if e.is_conflict() && attempt < MAX_LOCK_ATTEMPTS => {
                    debug!(start_ts = %self.start_ts, %for_update_ts, attempt, "lock conflict, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ========================================================================
    // Commit / rollback
    // ========================================================================

    /// Commit all buffered writes atomically
    ///
    /// Returns the commit timestamp, or `None` if there was nothing to
    /// commit. On error before the primary commits, every lock is released
    /// and the transaction is `Aborted`.
    ///
    /// The commit keeps running if this future is dropped; the transaction
    /// then stays `Committing` and calling `commit` again returns the
    /// outcome.
    pub async fn commit(&mut self) -> Result<Option<Timestamp>> {
        if self.committing.is_none() {
            self.check_active()?;

            let mutations = self.buffer.mutations(&self.locked);
            if mutations.is_empty() {
                self.release_pending().await?;
                self.state = TransactionState::Committed;
                debug!(start_ts = %self.start_ts, "committed empty transaction");
                return Ok(None);
            }

            let keys: BTreeSet<Key> = mutations.iter().map(|m| m.key().clone()).collect();
            let primary = match &self.primary {
                Some(primary) if keys.contains(primary) => primary.clone(),
                _ => mutations[0].key().clone(),
            };
            let stray: Vec<Key> = self.pending_locks.difference(&keys).cloned().collect();
            let mut held = keys;
            held.extend(self.locked.iter().cloned());
            held.extend(self.pending_locks.iter().cloned());

            let job = CommitJob {
                driver: Arc::clone(&self.driver),
                deadline: self.deadline(),
                start_ts: self.start_ts,
                mutations,
                primary,
                held: held.into_iter().collect(),
                stray,
            };
            self.state = TransactionState::Committing;
            self.committing = Some(tokio::spawn(job.run()));
        }
        self.finish_commit().await
    }

    async fn finish_commit(&mut self) -> Result<Option<Timestamp>> {
        let Some(task) = self.committing.as_mut() else {
            return Err(Error::TransactionClosed { state: self.state });
        };
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(Error::StoreUnavailable(format!("commit task did not finish: {}", e))),
        };
        self.committing = None;

        match outcome {
            Ok(commit_ts) => {
                self.state = TransactionState::Committed;
                Ok(Some(commit_ts))
            }
            Err(e) => {
                self.state = TransactionState::Aborted;
                Err(e)
            }
        }
    }

    /// Release locks from unconfirmed requests of a transaction that writes
    /// nothing
    async fn release_pending(&mut self) -> Result<()> {
        if self.pending_locks.is_empty() {
            return Ok(());
        }
        let pending: Vec<Key> = self.pending_locks.iter().cloned().collect();
        with_timeout(
            "rollback",
            self.deadline(),
            self.driver.rollback(&pending, self.start_ts),
        )
        .await?;
        self.pending_locks.clear();
        Ok(())
    }

    /// Discard buffered writes and release pessimistic locks
    ///
    /// Allowed after a cancelled lock request. If the release RPC fails the
    /// transaction stays `Active` so the call can be retried.
    pub async fn rollback(&mut self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(Error::TransactionClosed { state: self.state });
        }

        let held = self.held_locks();
        if !held.is_empty() {
            with_timeout(
                "rollback",
                self.deadline(),
                self.driver.rollback(&held, self.start_ts),
            )
            .await?;
        }

        self.buffer.clear();
        self.locked.clear();
        self.pending_locks.clear();
        self.lock_in_flight = false;
        self.state = TransactionState::RolledBack;
        debug!(start_ts = %self.start_ts, "rolled back transaction");
        Ok(())
    }

    fn held_locks(&self) -> Vec<Key> {
        self.locked.union(&self.pending_locks).cloned().collect()
    }

    fn has_outstanding_work(&self) -> bool {
        !self.buffer.is_empty() || !self.locked.is_empty() || !self.pending_locks.is_empty()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state != TransactionState::Active || !self.has_outstanding_work() {
            return;
        }

        let held = self.held_locks();
        if !held.is_empty() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let driver = Arc::clone(&self.driver);
                let start_ts = self.start_ts;
                handle.spawn(async move {
                    if let Err(e) = driver.rollback(&held, start_ts).await {
                        warn!(%start_ts, error = %e, "failed to release locks of dropped transaction");
                    }
                });
            }
        }

        match self.config.drop_check {
            DropCheck::Panic if !std::thread::panicking() => {
                panic!(
                    "transaction {} dropped while active; call commit or rollback",
                    self.start_ts
                );
            }
            DropCheck::Panic | DropCheck::Warn => {
                error!(start_ts = %self.start_ts, "transaction dropped while active");
            }
            DropCheck::None => {}
        }
    }
}
