//! Blocking API
//!
//! Mirrors the async clients for callers without a runtime of their own.
//! Calls are executed on a [`Worker`]: a dedicated thread owning a tokio
//! runtime, so the caller's thread simply parks until the result is ready.
//!
//! ```ignore
//! use keyspan::blocking::TransactionClient;
//!
//! let client = TransactionClient::connect(connector, vec!["127.0.0.1:2379"])?;
//! let txn = client.begin_pessimistic()?;
//! let balance = txn.get_for_update("account:1")?;
//! txn.put("account:1", "90")?;
//! txn.commit()?;
//! ```
//!
//! Rules:
//! - results and errors are exactly those of the async API
//! - a transaction or snapshot handle runs one call at a time; a concurrent
//!   second call fails with `Misuse`
//! - calling from inside an async runtime fails with `Misuse`; use the async
//!   clients there

mod raw;
mod transaction;
mod worker;

pub use raw::RawClient;
pub use transaction::{Snapshot, Transaction, TransactionClient};
pub use worker::Worker;
