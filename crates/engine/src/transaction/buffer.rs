//! Local mutation buffer
//!
//! Holds a transaction's writes until commit, one entry per key, last write
//! wins. Reads consult the buffer before the store so a transaction always
//! sees its own writes.

use keyspan_core::{BoundRange, Error, Key, KvPair, Mutation, Result, Value};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
enum BufferEntry {
    Put(Value),
    Insert(Value),
    Del,
    /// Lock only; reads fall through to the store
    Locked,
}

/// What the buffer knows about a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Lookup {
    /// Written by this transaction
    Value(Value),
    /// Deleted by this transaction
    Deleted,
    /// Not written; ask the store
    Miss,
}

#[derive(Debug, Default)]
pub(crate) struct Buffer {
    entries: BTreeMap<Key, BufferEntry>,
}

impl Buffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn lookup(&self, key: &Key) -> Lookup {
        match self.entries.get(key) {
            Some(BufferEntry::Put(value)) | Some(BufferEntry::Insert(value)) => Lookup::Value(value.clone()),
            Some(BufferEntry::Del) => Lookup::Deleted,
            Some(BufferEntry::Locked) | None => Lookup::Miss,
        }
    }

    pub(crate) fn put(&mut self, key: Key, value: Value) {
        self.entries.insert(key, BufferEntry::Put(value));
    }

    /// Fail if this transaction already wrote a value for `key`
    pub(crate) fn check_insert(&self, key: &Key) -> Result<()> {
        match self.entries.get(key) {
            Some(BufferEntry::Put(_)) | Some(BufferEntry::Insert(_)) => {
                Err(Error::AlreadyExists { key: key.clone() })
            }
            _ => Ok(()),
        }
    }

    /// Buffer an insert
    ///
    /// Over a buffered delete the key is known to be absent at commit, so the
    /// entry becomes a plain put.
    pub(crate) fn insert(&mut self, key: Key, value: Value) -> Result<()> {
        self.check_insert(&key)?;
        let entry = match self.entries.get(&key) {
            Some(BufferEntry::Del) => BufferEntry::Put(value),
            _ => BufferEntry::Insert(value),
        };
        self.entries.insert(key, entry);
        Ok(())
    }

    pub(crate) fn delete(&mut self, key: Key) {
        self.entries.insert(key, BufferEntry::Del);
    }

    /// Mark `key` for locking at commit without replacing a buffered write
    pub(crate) fn lock(&mut self, key: Key) {
        self.entries.entry(key).or_insert(BufferEntry::Locked);
    }

    /// Number of buffered deletes falling in `range`
    pub(crate) fn deletes_in(&self, range: &BoundRange) -> usize {
        if range.is_empty() {
            return 0;
        }
        self.entries
            .range(range.clone())
            .filter(|(_, entry)| matches!(entry, BufferEntry::Del))
            .count()
    }

    /// Overlay buffered writes in `range` on pairs fetched from the store
    ///
    /// `fetched` must have been requested with `limit` plus the number of
    /// buffered deletes in `range`, so at least `limit` survivors precede any
    /// key the store did not return.
    pub(crate) fn merge_scan(
        &self,
        range: &BoundRange,
        fetched: Vec<KvPair>,
        limit: u32,
        key_only: bool,
    ) -> Vec<KvPair> {
        let mut merged: BTreeMap<Key, Value> = fetched.into_iter().map(|KvPair(k, v)| (k, v)).collect();
        if !range.is_empty() {
            for (key, entry) in self.entries.range(range.clone()) {
                match entry {
                    BufferEntry::Put(value) | BufferEntry::Insert(value) => {
                        let value = if key_only { Vec::new() } else { value.clone() };
                        merged.insert(key.clone(), value);
                    }
                    BufferEntry::Del => {
                        merged.remove(key);
                    }
                    BufferEntry::Locked => {}
                }
            }
        }
        merged
            .into_iter()
            .take(limit as usize)
            .map(|(k, v)| KvPair(k, v))
            .collect()
    }

    /// Mutations to prewrite, plus a `Lock` for every key in `locked` that
    /// was not otherwise written
    pub(crate) fn mutations(&self, locked: &BTreeSet<Key>) -> Vec<Mutation> {
        let mut mutations: Vec<Mutation> = self
            .entries
            .iter()
            .map(|(key, entry)| match entry {
                BufferEntry::Put(value) => Mutation::Put(key.clone(), value.clone()),
                BufferEntry::Insert(value) => Mutation::Insert(key.clone(), value.clone()),
                BufferEntry::Del => Mutation::Delete(key.clone()),
                BufferEntry::Locked => Mutation::Lock(key.clone()),
            })
            .collect();
        mutations.extend(
            locked
                .iter()
                .filter(|key| !self.entries.contains_key(*key))
                .map(|key| Mutation::Lock(key.clone())),
        );
        mutations
    }
}
