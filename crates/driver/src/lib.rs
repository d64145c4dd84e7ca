//! Cluster driver interface for keyspan
//!
//! The engine never talks to storage nodes directly. Everything it needs from
//! the cluster goes through three traits:
//! - [`ClusterDriver`]: timestamps, MVCC reads and the two-phase commit RPCs
//! - [`RawDriver`]: non-transactional column-family reads and writes
//! - [`Connector`]: turns an endpoint address into a connected driver
//!
//! Region routing, the wire protocol, retries and connection pooling live
//! behind these traits. A driver is shared by many clients and transactions
//! at once, so every method takes `&self`.
//!
//! [`MemoryCluster`] is an in-process implementation of all three with real
//! MVCC visibility, lock waiting and TTL expiry. Tests and demos run against
//! it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;

pub use memory::MemoryCluster;

use async_trait::async_trait;
use keyspan_core::{BoundRange, ColumnFamily, Key, KvPair, Mutation, Result, Timestamp, Value};
use std::sync::Arc;
use std::time::Duration;

/// Transactional RPCs against the cluster
#[async_trait]
pub trait ClusterDriver: Send + Sync {
    /// Allocate a fresh, strictly increasing timestamp
    async fn get_timestamp(&self) -> Result<Timestamp>;

    /// Read the newest version of `key` committed at or before `ts`
    async fn read(&self, key: &Key, ts: Timestamp) -> Result<Option<Value>>;

    /// Check whether `key` is visible at `ts` without transferring its value
    async fn exists(&self, key: &Key, ts: Timestamp) -> Result<bool> {
        Ok(self.read(key, ts).await?.is_some())
    }

    /// Read several keys at `ts`; absent keys are left out
    async fn batch_read(&self, keys: &[Key], ts: Timestamp) -> Result<Vec<KvPair>>;

    /// Up to `limit` visible pairs in `range`, ascending by key
    ///
    /// With `key_only` the values come back empty.
    async fn scan(
        &self,
        range: &BoundRange,
        ts: Timestamp,
        limit: u32,
        key_only: bool,
    ) -> Result<Vec<KvPair>>;

    /// First phase of commit: lock every mutated key under `primary`
    ///
    /// Fails without leaving any lock when a key is locked by another
    /// transaction, was committed after `start_ts`, or an `Insert` finds an
    /// existing value.
    async fn prewrite(&self, mutations: &[Mutation], primary: &Key, start_ts: Timestamp) -> Result<()>;

    /// Second phase: make prewritten keys visible at `commit_ts`
    async fn commit(&self, keys: &[Key], start_ts: Timestamp, commit_ts: Timestamp) -> Result<()>;

    /// Release every lock `start_ts` holds on `keys`, prewrite or pessimistic
    async fn rollback(&self, keys: &[Key], start_ts: Timestamp) -> Result<()>;

    /// Lock `keys` for a pessimistic transaction
    ///
    /// Waits up to `wait` for conflicting locks to clear, then fails with
    /// `LockTimeout`. Fails with `WriteConflict` if a key was committed after
    /// `for_update_ts`.
    async fn acquire_pessimistic_lock(
        &self,
        keys: &[Key],
        primary: &Key,
        start_ts: Timestamp,
        for_update_ts: Timestamp,
        wait: Duration,
    ) -> Result<()>;

    /// Drop versions no reader at or after `safepoint` can observe
    async fn gc(&self, safepoint: Timestamp) -> Result<bool>;
}

/// Raw (non-transactional) RPCs against the cluster
#[async_trait]
pub trait RawDriver: Send + Sync {
    /// Read one key
    async fn raw_get(&self, cf: ColumnFamily, key: &Key) -> Result<Option<Value>>;

    /// Read several keys; absent keys are left out
    async fn raw_batch_get(&self, cf: ColumnFamily, keys: &[Key]) -> Result<Vec<KvPair>>;

    /// Write one key, expiring after `ttl_secs` when given
    async fn raw_put(&self, cf: ColumnFamily, pair: KvPair, ttl_secs: Option<u64>) -> Result<()>;

    /// Write several keys, each with its own optional TTL
    async fn raw_batch_put(&self, cf: ColumnFamily, pairs: Vec<(KvPair, Option<u64>)>) -> Result<()>;

    /// Remove one key
    async fn raw_delete(&self, cf: ColumnFamily, key: &Key) -> Result<()>;

    /// Remove several keys
    async fn raw_batch_delete(&self, cf: ColumnFamily, keys: &[Key]) -> Result<()>;

    /// Remove every key in `range`
    async fn raw_delete_range(&self, cf: ColumnFamily, range: &BoundRange) -> Result<()>;

    /// Up to `limit` live pairs in `range`, ascending by key
    async fn raw_scan(
        &self,
        cf: ColumnFamily,
        range: &BoundRange,
        limit: u32,
        key_only: bool,
    ) -> Result<Vec<KvPair>>;

    /// Remaining TTL of `key` in seconds; `None` if absent or without TTL
    async fn raw_get_key_ttl(&self, cf: ColumnFamily, key: &Key) -> Result<Option<u64>>;
}

/// Resolves an endpoint address to a connected driver
#[async_trait]
pub trait Connector: Send + Sync {
    /// Driver produced by a successful connection
    type Driver: ClusterDriver + RawDriver + 'static;

    /// Connect to a single endpoint
    ///
    /// Fails with `Connection` if the endpoint is unreachable or its cluster
    /// metadata cannot be fetched.
    async fn connect(&self, endpoint: &str) -> Result<Arc<Self::Driver>>;
}
