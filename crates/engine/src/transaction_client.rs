//! Transaction client
//!
//! Factory for [`Transaction`]s and [`Snapshot`]s over one connection.
//! Cloning is cheap; clones share the connection.
//!
//! ```ignore
//! let client = TransactionClient::connect(&connector, vec!["127.0.0.1:2379"]).await?;
//! let mut txn = client.begin_optimistic().await?;
//! txn.put("k", "v").await?;
//! txn.commit().await?;
//! ```

use crate::client::{connect_any, with_timeout};
use crate::{Snapshot, Transaction};
use keyspan_core::{Config, LockingMode, Result, Timestamp};
use keyspan_driver::{ClusterDriver, Connector};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Client for transactional access
#[derive(Clone)]
pub struct TransactionClient {
    driver: Arc<dyn ClusterDriver>,
    config: Arc<Config>,
}

impl fmt::Debug for TransactionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TransactionClient {
    /// Connect with the default configuration
    pub async fn connect<C, S>(connector: &C, endpoints: Vec<S>) -> Result<TransactionClient>
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
    ) -> Result<TransactionClient>
    where
        C: Connector,
        S: Into<String>,
    {
        let endpoints = endpoints.into_iter().map(Into::into).collect();
        let driver = connect_any(connector, endpoints, &config).await?;
        Ok(TransactionClient {
            driver,
            config: Arc::new(config),
        })
    }

    /// Configuration this client was connected with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start an optimistic transaction
    pub async fn begin_optimistic(&self) -> Result<Transaction> {
        self.begin_with_mode(LockingMode::Optimistic).await
    }

    /// Start a pessimistic transaction
    pub async fn begin_pessimistic(&self) -> Result<Transaction> {
        self.begin_with_mode(LockingMode::Pessimistic).await
    }

    /// Start a transaction, pessimistic if `pessimistic` is set
    pub async fn begin(&self, pessimistic: bool) -> Result<Transaction> {
        self.begin_with_mode(LockingMode::from_pessimistic(pessimistic)).await
    }

    /// Start a transaction in `mode`
    pub async fn begin_with_mode(&self, mode: LockingMode) -> Result<Transaction> {
        let start_ts = self.current_timestamp().await?;
        Ok(Transaction::new(
            Arc::clone(&self.driver),
            Arc::clone(&self.config),
            start_ts,
            mode,
        ))
    }

    /// Read-only view at `timestamp`
    pub fn snapshot(&self, timestamp: Timestamp, pessimistic: bool) -> Snapshot {
        Snapshot::new(
            Arc::clone(&self.driver),
            Arc::clone(&self.config),
            timestamp,
            LockingMode::from_pessimistic(pessimistic),
        )
    }

    /// Fresh timestamp from the cluster
    pub async fn current_timestamp(&self) -> Result<Timestamp> {
        with_timeout(
            "get_timestamp",
            self.config.request_timeout_duration(),
            self.driver.get_timestamp(),
        )
        .await
    }

    /// Let the cluster drop versions no reader at or after `safepoint` needs
    ///
    /// Returns `false` if the cluster's safepoint was already at or past
    /// `safepoint`.
    pub async fn gc(&self, safepoint: Timestamp) -> Result<bool> {
        let advanced = with_timeout(
            "gc",
            self.config.request_timeout_duration(),
            self.driver.gc(safepoint),
        )
        .await?;
        info!(%safepoint, advanced, "gc");
        Ok(advanced)
    }
}
