//! Two-phase commit task
//!
//! A commit runs as its own task so that it reaches an outcome even when
//! the caller stops waiting: either every mutation becomes visible at one
//! commit timestamp, or every lock the transaction may hold is released.

use crate::client::with_timeout;
use keyspan_core::{Error, Key, Mutation, Result, Timestamp};
use keyspan_driver::ClusterDriver;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub(super) struct CommitJob {
    pub(super) driver: Arc<dyn ClusterDriver>,
    pub(super) deadline: Duration,
    pub(super) start_ts: Timestamp,
    pub(super) mutations: Vec<Mutation>,
    pub(super) primary: Key,
    /// Every key that may carry a lock of this transaction
    pub(super) held: Vec<Key>,
    /// Keys of unconfirmed lock requests that are not being committed
    pub(super) stray: Vec<Key>,
}

impl CommitJob {
    pub(super) async fn run(self) -> Result<Timestamp> {
        let start_ts = self.start_ts;
        let prewrite = with_timeout(
            "prewrite",
            self.deadline,
            self.driver.prewrite(&self.mutations, &self.primary, start_ts),
        )
        .await;
        if let Err(e) = prewrite {
            return Err(self.abort(e).await);
        }

        let commit_ts = match with_timeout("get_timestamp", self.deadline, self.driver.get_timestamp()).await {
            Ok(ts) => ts,
            Err(e) => return Err(self.abort(e).await),
        };

        let primary_commit = with_timeout(
            "commit",
            self.deadline,
            self.driver
                .commit(std::slice::from_ref(&self.primary), start_ts, commit_ts),
        )
        .await;
        if let Err(e) = primary_commit {
            return Err(self.abort(e).await);
        }

        let secondaries: Vec<Key> = self
            .mutations
            .iter()
            .map(|m| m.key().clone())
            .filter(|k| *k != self.primary)
            .collect();
        if !secondaries.is_empty() {
            let result = with_timeout(
                "commit",
                self.deadline,
                self.driver.commit(&secondaries, start_ts, commit_ts),
            )
            .await;
            if let Err(e) = result {
                warn!(
                    %start_ts,
                    %commit_ts,
                    keys = secondaries.len(),
                    error = %e,
                    "failed to commit secondaries; readers will resolve them"
                );
            }
        }

        if !self.stray.is_empty() {
            let result = with_timeout(
                "rollback",
                self.deadline,
                self.driver.rollback(&self.stray, start_ts),
            )
            .await;
            if let Err(e) = result {
                warn!(%start_ts, keys = self.stray.len(), error = %e, "failed to release unconfirmed locks");
            }
        }

        debug!(%start_ts, %commit_ts, "committed transaction");
        Ok(commit_ts)
    }

    /// Release every lock after a failed commit and return `cause`
    async fn abort(&self, cause: Error) -> Error {
        let cleanup = with_timeout(
            "rollback",
            self.deadline,
            self.driver.rollback(&self.held, self.start_ts),
        )
        .await;
        if let Err(e) = cleanup {
            warn!(start_ts = %self.start_ts, error = %e, "rollback after failed commit did not complete");
        }
        debug!(start_ts = %self.start_ts, error = %cause, "aborted transaction");
        cause
    }
}
