//! Blocking raw client

use super::Worker;
use keyspan_core::{BoundRange, ColumnFamily, Config, Key, KvPair, Result, Value};
use keyspan_driver::Connector;
use keyspan_engine::RawClient as AsyncRawClient;
use std::future::Future;

/// Blocking form of [`keyspan_engine::RawClient`]
///
/// Every method blocks the calling thread until the cluster answers and
/// returns exactly what the async client would.
#[derive(Debug, Clone)]
pub struct RawClient {
    inner: AsyncRawClient,
    worker: Worker,
}

impl RawClient {
    /// Connect with the default configuration
    pub fn connect<C, S>(connector: C, endpoints: Vec<S>) -> Result<RawClient>
    where
        C: Connector + 'static,
        S: Into<String>,
    {
        Self::connect_with_config(connector, endpoints, Config::default())
    }

    /// Connect with an explicit configuration, starting a new worker
    pub fn connect_with_config<C, S>(connector: C, endpoints: Vec<S>, config: Config) -> Result<RawClient>
    where
        C: Connector + 'static,
        S: Into<String>,
    {
        let worker = Worker::start(&config)?;
        Self::connect_on(worker, connector, endpoints, config)
    }

    /// Connect using an existing worker
    pub fn connect_on<C, S>(worker: Worker, connector: C, endpoints: Vec<S>, config: Config) -> Result<RawClient>
    where
        C: Connector + 'static,
        S: Into<String>,
    {
        let endpoints: Vec<String> = endpoints.into_iter().map(Into::into).collect();
        let inner = worker.run(async move {
            AsyncRawClient::connect_with_config(&connector, endpoints, config).await
        })?;
        Ok(RawClient { inner, worker })
    }

    /// A client for `cf` sharing this client's connection and worker
    pub fn with_cf(&self, cf: ColumnFamily) -> RawClient {
        RawClient {
            inner: self.inner.with_cf(cf),
            worker: self.worker.clone(),
        }
    }

    /// Column family this client operates on
    pub fn column_family(&self) -> ColumnFamily {
        self.inner.column_family()
    }

    /// Worker running this client's calls
    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    fn call<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce(AsyncRawClient) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.worker.run(f(self.inner.clone()))
    }

    /// Read one key
    pub fn get(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        let key = key.into();
        self.call(|c| async move { c.get(key).await })
    }

    /// Read several keys; absent keys are left out
    pub fn batch_get(&self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<Vec<KvPair>> {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        self.call(|c| async move { c.batch_get(keys).await })
    }

    /// Write one key without expiry
    pub fn put(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        self.call(|c| async move { c.put(key, value).await })
    }

    /// Write one key that expires after `ttl_secs`; zero means no expiry
    pub fn put_with_ttl(&self, key: impl Into<Key>, value: impl Into<Value>, ttl_secs: u64) -> Result<()> {
        let (key, value) = (key.into(), value.into());
        self.call(|c| async move { c.put_with_ttl(key, value, ttl_secs).await })
    }

    /// Write several keys in one request
    pub fn batch_put(&self, pairs: impl IntoIterator<Item = impl Into<KvPair>>) -> Result<()> {
        let pairs: Vec<KvPair> = pairs.into_iter().map(Into::into).collect();
        self.call(|c| async move { c.batch_put(pairs).await })
    }

    /// Write several keys in one request, each with its own TTL
    pub fn batch_put_with_ttl<K, V>(&self, entries: impl IntoIterator<Item = (K, V, u64)>) -> Result<()>
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        let entries: Vec<(Key, Value, u64)> = entries
            .into_iter()
            .map(|(k, v, ttl)| (k.into(), v.into(), ttl))
            .collect();
        self.call(|c| async move { c.batch_put_with_ttl(entries).await })
    }

    /// Remove one key
    pub fn delete(&self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        self.call(|c| async move { c.delete(key).await })
    }

    /// Remove several keys
    pub fn batch_delete(&self, keys: impl IntoIterator<Item = impl Into<Key>>) -> Result<()> {
        let keys: Vec<Key> = keys.into_iter().map(Into::into).collect();
        self.call(|c| async move { c.batch_delete(keys).await })
    }

    /// Remove every key in `range`
    pub fn delete_range(&self, range: impl Into<BoundRange>) -> Result<()> {
        let range = range.into();
        self.call(|c| async move { c.delete_range(range).await })
    }

    /// Up to `limit` pairs in `range`, ascending by key
    pub fn scan(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<KvPair>> {
        let range = range.into();
        self.call(|c| async move { c.scan(range, limit).await })
    }

    /// Up to `limit` keys in `range`, ascending
    pub fn scan_keys(&self, range: impl Into<BoundRange>, limit: u32) -> Result<Vec<Key>> {
        let range = range.into();
        self.call(|c| async move { c.scan_keys(range, limit).await })
    }

    /// Remaining TTL in whole seconds, rounded up
    pub fn get_key_ttl_secs(&self, key: impl Into<Key>) -> Result<Option<u64>> {
        let key = key.into();
        self.call(|c| async move { c.get_key_ttl_secs(key).await })
    }
}
