//! Multi-version store with percolator-style locks
//!
//! Every key keeps its committed versions ordered by commit timestamp and at
//! most one lock. A read at `ts` sees the newest `Put`/`Delete` committed at
//! or before `ts`. Prewrite locks held by transactions that started at or
//! before `ts` block the read until they are committed or rolled back,
//! because such a transaction may still commit below `ts`.
//!
//! All methods are synchronous; the caller serializes access with a mutex
//! and handles waiting.

use keyspan_core::{BoundRange, Error, Key, KvPair, Mutation, Result, Timestamp, Value};
use std::collections::BTreeMap;

/// A committed version
#[derive(Debug, Clone)]
struct Write {
    start_ts: Timestamp,
    commit_ts: Timestamp,
    kind: WriteKind,
}

#[derive(Debug, Clone)]
enum WriteKind {
    Put(Value),
    Delete,
    /// Commit record of a `Lock` mutation; invisible to reads
    Lock,
}

#[derive(Debug, Clone)]
enum LockKind {
    /// Held by a pessimistic transaction before prewrite
    Pessimistic,
    /// Prewritten and waiting for commit
    Prewrite(WriteKind),
}

#[derive(Debug, Clone)]
struct Lock {
    start_ts: Timestamp,
    primary: Key,
    kind: LockKind,
}

#[derive(Debug, Default)]
struct KeyRecord {
    /// Ascending by `commit_ts`
    writes: Vec<Write>,
    lock: Option<Lock>,
}

impl KeyRecord {
    fn visible(&self, ts: Timestamp) -> Option<&Value> {
        self.writes
            .iter()
            .rev()
            .filter(|w| w.commit_ts <= ts)
            .find_map(|w| match &w.kind {
                WriteKind::Put(value) => Some(Some(value)),
                WriteKind::Delete => Some(None),
                WriteKind::Lock => None,
            })
            .flatten()
    }

    fn latest_commit_ts(&self) -> Option<Timestamp> {
        self.writes.last().map(|w| w.commit_ts)
    }

    fn committed_at(&self, start_ts: Timestamp) -> Option<Timestamp> {
        self.writes
            .iter()
            .find(|w| w.start_ts == start_ts)
            .map(|w| w.commit_ts)
    }

    fn push_write(&mut self, write: Write) {
        let at = self
            .writes
            .partition_point(|w| w.commit_ts <= write.commit_ts);
        self.writes.insert(at, write);
    }

    fn is_vacant(&self) -> bool {
        self.writes.is_empty() && self.lock.is_none()
    }
}

/// A read hit a prewrite lock that may still commit below the read point
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Blocked {
    pub(crate) key: Key,
}

/// How a blocking lock was settled by [`MvccStore::resolve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// Primary committed; this key was committed at the same timestamp
    RolledForward(Timestamp),
    /// Primary is gone without a commit record; the lock was dropped
    RolledBack,
    /// Owner is still between prewrite and primary commit
    Pending,
}

/// MVCC keyspace for transactional data
#[derive(Debug, Default)]
pub(crate) struct MvccStore {
    records: BTreeMap<Key, KeyRecord>,
}

impl MvccStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn check_readable(&self, key: &Key, record: &KeyRecord, ts: Timestamp) -> std::result::Result<(), Blocked> {
        match &record.lock {
            Some(lock) if matches!(lock.kind, LockKind::Prewrite(_)) && lock.start_ts <= ts => {
                Err(Blocked { key: key.clone() })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn get(&self, key: &Key, ts: Timestamp) -> std::result::Result<Option<Value>, Blocked> {
        let Some(record) = self.records.get(key) else {
            return Ok(None);
        };
        self.check_readable(key, record, ts)?;
        Ok(record.visible(ts).cloned())
    }

    pub(crate) fn exists(&self, key: &Key, ts: Timestamp) -> std::result::Result<bool, Blocked> {
        let Some(record) = self.records.get(key) else {
            return Ok(false);
        };
        self.check_readable(key, record, ts)?;
        Ok(record.visible(ts).is_some())
    }

    pub(crate) fn scan(
        &self,
        range: &BoundRange,
        ts: Timestamp,
        limit: u32,
        key_only: bool,
    ) -> std::result::Result<Vec<KvPair>, Blocked> {
        let mut pairs = Vec::new();
        if range.is_empty() || limit == 0 {
            return Ok(pairs);
        }
        for (key, record) in self.records.range(range.clone()) {
            self.check_readable(key, record, ts)?;
            if let Some(value) = record.visible(ts) {
                let value = if key_only { Vec::new() } else { value.clone() };
                pairs.push(KvPair(key.clone(), value));
                if pairs.len() >= limit as usize {
                    break;
                }
            }
        }
        Ok(pairs)
    }

    /// Validate every mutation, then lock them all
    ///
    /// Nothing is locked unless every key passes.
    pub(crate) fn prewrite(&mut self, mutations: &[Mutation], primary: &Key, start_ts: Timestamp) -> Result<()> {
        for mutation in mutations {
            let key = mutation.key();
            let Some(record) = self.records.get(key) else {
                continue;
            };
            let own_pessimistic = match &record.lock {
                Some(lock) if lock.start_ts != start_ts => {
                    return Err(Error::WriteConflict {
                        key: key.clone(),
                        start_ts,
                        conflict_ts: lock.start_ts,
                    });
                }
                Some(lock) => matches!(lock.kind, LockKind::Pessimistic),
                None => false,
            };
            if !own_pessimistic {
                if let Some(commit_ts) = record.latest_commit_ts().filter(|ts| *ts > start_ts) {
                    return Err(Error::WriteConflict {
                        key: key.clone(),
                        start_ts,
                        conflict_ts: commit_ts,
                    });
                }
            }
            if matches!(mutation, Mutation::Insert(..)) && record.visible(Timestamp::from_version(u64::MAX)).is_some() {
                return Err(Error::AlreadyExists { key: key.clone() });
            }
        }

        for mutation in mutations {
            let intent = match mutation {
                Mutation::Put(_, value) | Mutation::Insert(_, value) => WriteKind::Put(value.clone()),
                Mutation::Delete(_) => WriteKind::Delete,
                Mutation::Lock(_) => WriteKind::Lock,
            };
            let record = self.records.entry(mutation.key().clone()).or_default();
            record.lock = Some(Lock {
                start_ts,
                primary: primary.clone(),
                kind: LockKind::Prewrite(intent),
            });
        }
        Ok(())
    }

    /// Turn prewrite locks into committed versions
    ///
    /// Idempotent for keys already committed by `start_ts`.
    pub(crate) fn commit(&mut self, keys: &[Key], start_ts: Timestamp, commit_ts: Timestamp) -> Result<()> {
        for key in keys {
            let record = self.records.entry(key.clone()).or_default();
            match record.lock.take() {
                Some(Lock {
                    start_ts: owner,
                    kind: LockKind::Prewrite(kind),
                    ..
                }) if owner == start_ts => {
                    record.push_write(Write {
                        start_ts,
                        commit_ts,
                        kind,
                    });
                }
                other => {
                    record.lock = other;
                    if record.committed_at(start_ts).is_none() {
                        return Err(Error::StoreUnavailable(format!(
                            "no prewrite lock of txn {} on key {}",
                            start_ts, key
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Drop every lock `start_ts` holds on `keys`
    pub(crate) fn rollback(&mut self, keys: &[Key], start_ts: Timestamp) {
        for key in keys {
            if let Some(record) = self.records.get_mut(key) {
                if record.lock.as_ref().is_some_and(|lock| lock.start_ts == start_ts) {
                    record.lock = None;
                }
                if record.is_vacant() {
                    self.records.remove(key);
                }
            }
        }
    }

    /// Try to lock `keys` for a pessimistic transaction
    ///
    /// Returns the first key held by someone else, granting nothing, or
    /// grants all keys and returns `None`.
    pub(crate) fn try_lock_pessimistic(
        &mut self,
        keys: &[Key],
        primary: &Key,
        start_ts: Timestamp,
        for_update_ts: Timestamp,
    ) -> Result<Option<Key>> {
        for key in keys {
            let Some(record) = self.records.get(key) else {
                continue;
            };
            if let Some(lock) = &record.lock {
                if lock.start_ts != start_ts {
                    return Ok(Some(key.clone()));
                }
            }
            if let Some(commit_ts) = record.latest_commit_ts().filter(|ts| *ts > for_update_ts) {
                return Err(Error::WriteConflict {
                    key: key.clone(),
                    start_ts,
                    conflict_ts: commit_ts,
                });
            }
        }

        for key in keys {
            let record = self.records.entry(key.clone()).or_default();
            if record.lock.is_none() {
                record.lock = Some(Lock {
                    start_ts,
                    primary: primary.clone(),
                    kind: LockKind::Pessimistic,
                });
            }
        }
        Ok(None)
    }

    /// Settle a prewrite lock on `key` by consulting its primary
    pub(crate) fn resolve(&mut self, key: &Key) -> Resolution {
        let Some(lock) = self.records.get(key).and_then(|r| r.lock.clone()) else {
            return Resolution::RolledBack;
        };
        let LockKind::Prewrite(_) = lock.kind else {
            return Resolution::Pending;
        };
        let primary = self.records.get(&lock.primary);
        let primary_locked = primary
            .and_then(|r| r.lock.as_ref())
            .is_some_and(|l| l.start_ts == lock.start_ts);
        let primary_commit = primary.and_then(|r| r.committed_at(lock.start_ts));

        match primary_commit {
            Some(commit_ts) => match self.commit(std::slice::from_ref(key), lock.start_ts, commit_ts) {
                Ok(()) => Resolution::RolledForward(commit_ts),
                Err(_) => Resolution::Pending,
            },
            None if primary_locked => Resolution::Pending,
            None => {
                self.rollback(std::slice::from_ref(key), lock.start_ts);
                Resolution::RolledBack
            }
        }
    }

    /// Drop versions superseded at `safepoint`
    ///
    /// Keeps the newest version committed at or before `safepoint` unless it
    /// is a delete, and everything newer. Prewrite locks that started at or
    /// before `safepoint` are settled first, while their primary still has
    /// its commit record.
    pub(crate) fn gc(&mut self, safepoint: Timestamp) -> usize {
        let stale: Vec<Key> = self
            .records
            .iter()
            .filter(|(_, record)| {
                record
                    .lock
                    .as_ref()
                    .is_some_and(|lock| matches!(lock.kind, LockKind::Prewrite(_)) && lock.start_ts <= safepoint)
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.resolve(key);
        }

        let mut dropped = 0;
        for record in self.records.values_mut() {
            let Some(anchor) = record
                .writes
                .iter()
                .rposition(|w| w.commit_ts <= safepoint && !matches!(w.kind, WriteKind::Lock))
            else {
                continue;
            };
            let keep_anchor = matches!(record.writes[anchor].kind, WriteKind::Put(_));
            let cut = if keep_anchor { anchor } else { anchor + 1 };
            let older_locks = record.writes[cut..]
                .iter()
                .take_while(|w| w.commit_ts <= safepoint)
                .filter(|w| matches!(w.kind, WriteKind::Lock))
                .count();
            dropped += cut;
            record.writes.drain(..cut);
            if older_locks > 0 {
                let before = record.writes.len();
                record
                    .writes
                    .retain(|w| w.commit_ts > safepoint || !matches!(w.kind, WriteKind::Lock));
                dropped += before - record.writes.len();
            }
        }
        self.records.retain(|_, record| !record.is_vacant());
        dropped
    }

    #[cfg(test)]
    fn version_count(&self, key: &Key) -> usize {
        self.records.get(key).map_or(0, |r| r.writes.len())
    }
}
