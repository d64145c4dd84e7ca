//! Core types for keyspan
//!
//! This crate defines the data model shared by every layer of the client:
//! - [`Key`], [`Value`], [`KvPair`]: opaque byte keys and values
//! - [`Timestamp`]: cluster-issued logical time
//! - [`ColumnFamily`]: closed set of raw keyspace partitions
//! - [`BoundRange`]: key ranges with inclusive/exclusive bounds
//! - [`Mutation`]: buffered transactional intent
//! - [`Error`]: the error taxonomy surfaced to callers
//! - [`Config`]: client tuning knobs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod mutation;
pub mod range;
pub mod types;

pub use config::{Config, DropCheck};
pub use error::{Error, Result};
pub use mutation::Mutation;
pub use range::BoundRange;
pub use types::{ColumnFamily, Key, KvPair, LockingMode, Timestamp, TransactionState, Value};

/// Maximum number of entries a single raw scan may request.
pub const MAX_RAW_SCAN_LIMIT: u32 = 10240;
