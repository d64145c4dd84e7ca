//! Unified error type for keyspan.
//!
//! Every layer (driver, engine, blocking bridge) reports failures through the
//! same [`Error`] so a caller sees one taxonomy regardless of which calling
//! convention it used. A missing key is never an error; reads return `None`
//! or an empty list instead.

use crate::types::{Key, Timestamp, TransactionState};
use std::time::Duration;
use thiserror::Error;

/// All keyspan errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// No endpoint reachable, or cluster metadata could not be fetched.
    ///
    /// Fatal to the client instance; reconnect to recover.
    #[error("connection error: {0}")]
    Connection(String),

    /// The store could not serve the request right now
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// An RPC did not complete within its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Deadline that was exceeded
        after: Duration,
    },

    /// Another transaction holds a conflicting lock or committed a newer write
    #[error("write conflict on key {key} (start_ts {start_ts}, conflicting ts {conflict_ts})")]
    WriteConflict {
        /// Conflicting key
        key: Key,
        /// Start timestamp of the transaction that lost
        start_ts: Timestamp,
        /// Start or commit timestamp of the conflicting writer
        conflict_ts: Timestamp,
    },

    /// A pessimistic lock could not be acquired within the allowed wait
    #[error("lock wait timed out on key {key}")]
    LockTimeout {
        /// Key still held by another transaction
        key: Key,
    },

    /// The transaction is no longer active
    #[error("transaction is closed ({state})")]
    TransactionClosed {
        /// State the transaction was in
        state: TransactionState,
    },

    /// The API was used in a way it does not support
    #[error("misuse: {0}")]
    Misuse(String),

    /// `insert` targeted a key that already exists
    #[error("key already exists: {key}")]
    AlreadyExists {
        /// Existing key
        key: Key,
    },

    /// A lock acquisition was cancelled before it completed
    ///
    /// Locks may be outstanding; the transaction must be rolled back.
    #[error("lock acquisition was cancelled; roll back the transaction")]
    LockCancelled,

    /// Unknown column family name
    #[error("invalid column family: {0}")]
    InvalidColumnFamily(String),

    /// Raw scan limit above the per-request maximum
    #[error("scan limit {limit} exceeds maximum {max}")]
    ScanLimitExceeded {
        /// Requested limit
        limit: u32,
        /// Largest accepted limit
        max: u32,
    },

    /// Configuration could not be parsed or is inconsistent
    #[error("invalid config: {0}")]
    Config(String),

    /// The blocking worker has shut down
    #[error("blocking worker has shut down")]
    WorkerShutdown,
}

/// Result type for keyspan operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error may succeed on retry.
    ///
    /// Raw operations can be retried as-is; transactional ones need a fresh
    /// transaction after a conflict.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_)
                | Error::Timeout { .. }
                | Error::WriteConflict { .. }
                | Error::LockTimeout { .. }
        )
    }

    /// Check if this is a write conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::WriteConflict { .. })
    }

    /// Check if this is a timeout of any kind.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::LockTimeout { .. })
    }

    /// Check if this error indicates a bug in the calling code.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Error::TransactionClosed { .. } | Error::Misuse(_) | Error::InvalidColumnFamily(_)
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
