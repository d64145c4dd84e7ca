//! Fundamental value types
//!
//! Keys and values are opaque byte strings. Keys order byte-lexicographically,
//! which is the order every scan returns.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque value bytes
pub type Value = Vec<u8>;

/// A key in the store
///
/// Ordering is plain byte-lexicographic comparison of the underlying bytes.
///
/// # Examples
///
/// ```
/// use keyspan_core::Key;
///
/// let a = Key::from("k1");
/// let b = Key::from("k10");
/// assert!(a < b);
/// ```
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(Vec<u8>);

impl Key {
    /// The empty key, which sorts before every other key
    pub const EMPTY: Key = Key(Vec::new());

    /// Create a key from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Key(bytes.into())
    }

    /// Borrow the key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the key, returning its bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// Check if this is the empty key
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The smallest key strictly greater than this one
    ///
    /// Appending a zero byte yields the immediate successor in byte order.
    pub fn successor(&self) -> Key {
        let mut bytes = Vec::with_capacity(self.0.len() + 1);
        bytes.extend_from_slice(&self.0);
        bytes.push(0);
        Key(bytes)
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Key(bytes)
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Key(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Key {
    fn from(bytes: &[u8; N]) -> Self {
        Key(bytes.to_vec())
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.as_bytes().to_vec())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s.into_bytes())
    }
}

impl From<Key> for Vec<u8> {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(b\"{}\")", self)
    }
}

impl fmt::Display for Key {
    /// Printable ASCII is shown as-is, everything else escaped
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{}", std::ascii::escape_default(*byte))?;
        }
        Ok(())
    }
}

/// A key paired with its value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvPair(pub Key, pub Value);

impl KvPair {
    /// Create a new pair
    pub fn new(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        KvPair(key.into(), value.into())
    }

    /// Borrow the key
    pub fn key(&self) -> &Key {
        &self.0
    }

    /// Borrow the value
    pub fn value(&self) -> &[u8] {
        &self.1
    }

    /// Consume the pair, returning the key
    pub fn into_key(self) -> Key {
        self.0
    }

    /// Consume the pair, returning the value
    pub fn into_value(self) -> Value {
        self.1
    }
}

impl From<(Key, Value)> for KvPair {
    fn from((key, value): (Key, Value)) -> Self {
        KvPair(key, value)
    }
}

impl From<KvPair> for (Key, Value) {
    fn from(pair: KvPair) -> Self {
        (pair.0, pair.1)
    }
}

/// Cluster-issued logical time
///
/// Strictly increasing across allocations. Used as a transaction's start and
/// commit timestamp and as a snapshot's read point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The zero timestamp; nothing is visible at it
    pub const ZERO: Timestamp = Timestamp(0);

    /// Build a timestamp from its raw version number
    pub const fn from_version(version: u64) -> Self {
        Timestamp(version)
    }

    /// Raw version number
    pub const fn version(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named partition of the raw keyspace
///
/// A closed set, so an invalid name is rejected at parse time instead of
/// reaching the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnFamily {
    /// The default column family
    #[default]
    Default,
    /// The lock column family
    Lock,
    /// The write column family
    Write,
}

impl ColumnFamily {
    /// All column families, in declaration order
    pub const ALL: [ColumnFamily; 3] = [ColumnFamily::Default, ColumnFamily::Lock, ColumnFamily::Write];

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnFamily::Default => "default",
            ColumnFamily::Lock => "lock",
            ColumnFamily::Write => "write",
        }
    }
}

impl fmt::Display for ColumnFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(ColumnFamily::Default),
            "lock" => Ok(ColumnFamily::Lock),
            "write" => Ok(ColumnFamily::Write),
            other => Err(Error::InvalidColumnFamily(other.to_string())),
        }
    }
}

impl TryFrom<&str> for ColumnFamily {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Concurrency control mode of a transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockingMode {
    /// Conflicts detected at commit time
    #[default]
    Optimistic,
    /// Conflicts prevented by locking at write/`get_for_update` time
    Pessimistic,
}

impl LockingMode {
    /// Mode from the `pessimistic` flag used by the client factories
    pub fn from_pessimistic(pessimistic: bool) -> Self {
        if pessimistic {
            LockingMode::Pessimistic
        } else {
            LockingMode::Optimistic
        }
    }

    /// Check if this is pessimistic mode
    pub fn is_pessimistic(&self) -> bool {
        matches!(self, LockingMode::Pessimistic)
    }
}

/// Lifecycle state of a transaction
///
/// ```text
/// Active ──commit──► Committing ──► Committed
///   │                     └───────► Aborted
///   └──rollback──► RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    /// Accepting reads and writes
    Active,
    /// Two-phase commit in progress
    Committing,
    /// All mutations visible at the commit timestamp
    Committed,
    /// Commit failed; no mutation visible
    Aborted,
    /// Rolled back by the caller; no mutation visible
    RolledBack,
}

impl TransactionState {
    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted | TransactionState::RolledBack
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Active => "active",
            TransactionState::Committing => "committing",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
            TransactionState::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}
