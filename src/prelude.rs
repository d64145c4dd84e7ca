//! Convenient imports for keyspan.
//!
//! ```ignore
//! use keyspan::prelude::*;
//! ```

// Async clients
pub use crate::{RawClient, Snapshot, Transaction, TransactionClient};

// Error handling
pub use crate::{Error, Result};

// Core types
pub use crate::{BoundRange, ColumnFamily, Config, Key, KvPair, LockingMode, Timestamp, Value};

// Drivers
pub use crate::{Connector, MemoryCluster};
