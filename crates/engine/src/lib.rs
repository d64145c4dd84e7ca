//! Async engine for keyspan
//!
//! This crate turns a connected cluster driver into the client-facing API:
//! - [`RawClient`]: lock-free single-key and batch operations with TTL
//! - [`TransactionClient`]: factory for transactions and snapshots
//! - [`Transaction`]: buffered, snapshot-isolated reads and writes committed
//!   with two-phase commit
//! - [`Snapshot`]: read-only view at a fixed timestamp
//!
//! Every cluster RPC is bounded by [`Config::request_timeout`]; a timed-out
//! call fails with [`Error::Timeout`] and leaves a transaction `Active`.
//!
//! [`Config::request_timeout`]: keyspan_core::Config::request_timeout
//! [`Error::Timeout`]: keyspan_core::Error::Timeout

#![warn(missing_docs)]
#![warn(clippy::all)]

mod client;
pub mod raw;
pub mod snapshot;
pub mod transaction;
pub mod transaction_client;

pub use raw::RawClient;
pub use snapshot::Snapshot;
pub use transaction::Transaction;
pub use transaction_client::TransactionClient;
