//! # keyspan
//!
//! Client library for a distributed, transactional key-value store.
//!
//! Two access modes over one connection model:
//!
//! - **Raw**: lock-free single-key and batch operations with optional
//!   per-key TTL, partitioned by column family ([`RawClient`])
//! - **Transactional**: snapshot-isolated multi-key reads and writes with
//!   optimistic or pessimistic concurrency control ([`TransactionClient`],
//!   [`Transaction`], [`Snapshot`])
//!
//! Both are available as async APIs (this module) and as blocking APIs
//! ([`blocking`]) backed by a dedicated runtime thread.
//!
//! ## Quick Start
//!
//! ```ignore
//! use keyspan::prelude::*;
//!
//! let cluster = MemoryCluster::new().with_endpoint("mem://local");
//! let client = TransactionClient::connect(&cluster, vec!["mem://local"]).await?;
//!
//! let mut txn = client.begin_optimistic().await?;
//! txn.put("user:1", "alice").await?;
//! txn.commit().await?;
//!
//! let raw = RawClient::connect(&cluster, vec!["mem://local"]).await?;
//! raw.put_with_ttl("session:1", "token", 60).await?;
//! ```
//!
//! ## Cluster drivers
//!
//! Clients reach the cluster through the [`ClusterDriver`] and [`RawDriver`]
//! traits, obtained from a [`Connector`]. [`MemoryCluster`] implements all
//! three in-process.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blocking;
pub mod prelude;

pub use keyspan_core::{
    BoundRange, ColumnFamily, Config, DropCheck, Error, Key, KvPair, LockingMode, Mutation, Result,
    Timestamp, TransactionState, Value, MAX_RAW_SCAN_LIMIT,
};
pub use keyspan_driver::{ClusterDriver, Connector, MemoryCluster, RawDriver};
pub use keyspan_engine::{RawClient, Snapshot, Transaction, TransactionClient};
