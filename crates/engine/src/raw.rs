//! Raw (non-transactional) client
//!
//! Each call is a single RPC whose effect is visible to every later read.
//! Batches are sent as one request but are not atomic. A client is bound to a
//! column family; [`RawClient::with_cf`] derives a client for another family
//! over the same connection.

use crate::client::{connect_any, with_timeout};
use keyspan_core::{
    BoundRange, ColumnFamily, Config, Error, Key, KvPair, Result, Value, MAX_RAW_SCAN_LIMIT,
};
use keyspan_driver::{Connector, RawDriver};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Client for raw key-value operations
#[derive(Clone)]
pub struct RawClient {
    driver: Arc<dyn RawDriver>,
    config: Arc<Config>,
    cf: ColumnFamily,
}

impl fmt::Debug for RawClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawClient")
            .field("cf", &self.cf)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RawClient {
    /// Connect with the default configuration
    ///
    /// Endpoints are tried in order; `Connection` if none is reachable.
    pub async fn connect<C, S>(connector: &C, endpoints: Vec<S>) -> Result<RawClient>
    where
        C: Connector,
        S: Into<String>,
    {
        Self::connect_with_config(connector, endpoints, Config::default()).await
    }

    /// Connect with an explicit configuration
    pub async fn connect_with_config<C, S>(
        connector: &C,
        endpoints: Vec<S>,
        config: Config,
    ) -> Result<RawClient>
    where
        C: Connector,
        S: Into<String>,
    {
        let endpoints = endpoints.into_iter().map(Into::into).collect();
        let driver = connect_any(connector, endpoints, &config).await?;
        Ok(RawClient {
            driver,
            config: Arc::new(config),
            cf: ColumnFamily::Default,
        })
    }

    /// A client for `cf` sharing this client's connection
    pub fn with_cf(&self, cf: ColumnFamily) -> RawClient {
        RawClient {
            driver: Arc::clone(&self.driver),
            config: Arc::clone(&self.config),
            cf,
        }
    }

    /// Column family this client operates on
    pub fn column_family(&self) -> ColumnFamily {
        self.cf
    }

    fn deadline(&self) -> Duration {
        self.config.request_timeout_duration()
    }

    /// Read one key
    pub async fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        with_timeout("raw_get", self.deadline(), self.driver.raw_get(self.cf, &key)).await
    }

    /// Read several keys; absent keys are left out
    pub async fn batch_get(&self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<Vec<KvPair>> {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        with_timeout(
            "raw_batch_get",
            self.deadline(),
            self.driver.raw_batch_get(self.cf, &keys),
        )
        .await
    }

    /// Write one key without expiry
    pub async fn put(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        self.put_opt_ttl(key.into(), value.into(), None).await
    }

    /// Write one key that expires after `ttl_secs`; zero means no expiry
    pub async fn put_with_ttl(&self, key: impl Into<Key>, value: impl Into<Value>, ttl_secs: u64) -> Result<()> {
        self.put_opt_ttl(key.into(), value.into(), Some(ttl_secs)).await
    }

    async fn put_opt_ttl(&self, key: Key, value: Value, ttl_secs: Option<u64>) -> Result<()> {
        with_timeout(
            "raw_put",
            self.deadline(),
            self.driver.raw_put(self.cf, KvPair(key, value), ttl_secs),
        )
        .await
    }

    /// Write several keys in one request
    pub async fn batch_put(&self, pairs: impl IntoIterator<Item = impl Into<KvPair>>) -> Result<()> {
        let pairs: Vec<(KvPair, Option<u64>)> = pairs.into_iter().map(|p| (p.into(), None)).collect();
        self.send_batch_put(pairs).await
    }

    /// Write several keys in one request, each with its own TTL
    ///
    /// A TTL of zero means no expiry for that key.
    pub async fn batch_put_with_ttl<K, V>(&self, entries: impl IntoIterator<Item = (K, V, u64)>) -> Result<()>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        let pairs: Vec<(KvPair, Option<u64>)> = entries
            .into_iter()
            .map(|(key, value, ttl)| (KvPair(key.into(), value.into()), Some(ttl)))
            .collect();
        self.send_batch_put(pairs).await
    }

    async fn send_batch_put(&self, pairs: Vec<(KvPair, Option<u64>)>) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        debug!(cf = %self.cf, count = pairs.len(), "raw batch put");
        with_timeout(
            "raw_batch_put",
            self.deadline(),
            self.driver.raw_batch_put(self.cf, pairs),
        )
        .await
    }

    /// Remove one key; removing an absent key succeeds
    pub async fn delete(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        with_timeout("raw_delete", self.deadline(), self.driver.raw_delete(self.cf, &key)).await
    }

    /// Remove several keys
    pub async fn batch_delete(&self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<()> {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Ok(());
        }
        with_timeout(
            "raw_batch_delete",
            self.deadline(),
            self.driver.raw_batch_delete(self.cf, &keys),
        )
        .await
    }

    /// Remove every key in `range`
    pub async fn delete_range(&self, range: impl Into<BoundRange>) -> Result<()> {
        let range = range.into();
        if range.is_empty() {
            return Ok(());
        }
        with_timeout(
            "raw_delete_range",
            self.deadline(),
            self.driver.raw_delete_range(self.cf, &range),
        )
        .await
    }

    /// Up to `limit` pairs in `range`, ascending by key
    pub async fn scan(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<KvPair>> {
        self.scan_inner(range.into(), limit, false).await
    }

    /// Up to `limit` keys in `range`, ascending
    pub async fn scan_keys(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<Key>> {
        let pairs = self.scan_inner(range.into(), limit, true).await?;
        Ok(pairs.into_iter().map(KvPair::into_key).collect())
    }

    async fn scan_inner(&self, range: BoundRange, limit: u32, key_only: bool) -> Result<Vec<KvPair>> {
        if limit > MAX_RAW_SCAN_LIMIT {
            return Err(Error::ScanLimitExceeded {
                limit,
                max: MAX_RAW_SCAN_LIMIT,
            });
        }
        if limit == 0 || range.is_empty() {
            return Ok(Vec::new());
        }
        with_timeout(
            "raw_scan",
            self.deadline(),
            self.driver.raw_scan(self.cf, &range, limit, key_only),
        )
        .await
    }

    /// Remaining TTL in whole seconds, rounded up
    ///
    /// `None` if the key is absent, expired, or was written without TTL.
    pub async fn get_key_ttl_secs(&self, key: impl Into<Key>) -> Result<Option<u64>> {
        let key = key.into();
        with_timeout(
            "raw_get_key_ttl",
            self.deadline(),
            self.driver.raw_get_key_ttl(self.cf, &key),
        )
        .await
    }
}
