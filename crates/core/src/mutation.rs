//! Transactional mutations
//!
//! A [`Mutation`] is the buffered intent of a transaction. Mutations are
//! handed to the cluster driver at prewrite; until then nothing leaves the
//! client.

use crate::types::{Key, Value};

/// One buffered write intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Set `key` to `value`
    Put(Key, Value),
    /// Remove `key`
    Delete(Key),
    /// Set `key` to `value`, failing the prewrite if `key` already exists
    Insert(Key, Value),
    /// Lock `key` without changing it
    Lock(Key),
}

impl Mutation {
    /// The key this mutation targets
    pub fn key(&self) -> &Key {
        match self {
            Mutation::Put(key, _)
            | Mutation::Delete(key)
            | Mutation::Insert(key, _)
            | Mutation::Lock(key) => key,
        }
    }

    /// The value written, if any
    pub fn value(&self) -> Option<&[u8]> {
        match self {
            Mutation::Put(_, value) | Mutation::Insert(_, value) => Some(value),
            Mutation::Delete(_) | Mutation::Lock(_) => None,
        }
    }

    /// Check if this mutation changes the stored value
    ///
    /// `Lock` only participates in conflict detection.
    pub fn is_write(&self) -> bool {
        !matches!(self, Mutation::Lock(_))
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Put(..) => "put",
            Mutation::Delete(_) => "delete",
            Mutation::Insert(..) => "insert",
            Mutation::Lock(_) => "lock",
        }
    }
}
