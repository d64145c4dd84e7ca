//! Raw keyspace with per-key expiry
//!
//! One ordered map per column family. Expired entries are treated as absent
//! on every read and purged from a family after every
//! `PURGE_INTERVAL` writes to it.

use keyspan_core::{BoundRange, ColumnFamily, Key, KvPair, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Writes to a family between sweeps of its expired entries
const PURGE_INTERVAL: usize = 1024;

#[derive(Debug, Clone)]
struct RawEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl RawEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Default)]
struct Family {
    entries: BTreeMap<Key, RawEntry>,
    writes_since_purge: usize,
}

/// Column-family partitioned raw store
#[derive(Debug, Default)]
pub(crate) struct RawStore {
    families: HashMap<ColumnFamily, Family>,
}

impl RawStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn family(&self, cf: ColumnFamily) -> Option<&BTreeMap<Key, RawEntry>> {
        self.families.get(&cf).map(|family| &family.entries)
    }

    fn family_mut(&mut self, cf: ColumnFamily, now: Instant) -> &mut BTreeMap<Key, RawEntry> {
        let family = self.families.entry(cf).or_default();
        family.writes_since_purge += 1;
        if family.writes_since_purge >= PURGE_INTERVAL {
            family.entries.retain(|_, entry| entry.is_live(now));
            family.writes_since_purge = 0;
        }
        &mut family.entries
    }

    pub(crate) fn get(&self, cf: ColumnFamily, key: &Key, now: Instant) -> Option<Value> {
        self.family(cf)?
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    /// `ttl_secs` of `None` or `Some(0)` stores the key without expiry, as
    /// does a TTL too large to represent as an instant
    pub(crate) fn put(
        &mut self,
        cf: ColumnFamily,
        key: Key,
        value: Value,
        ttl_secs: Option<u64>,
        now: Instant,
    ) {
        let expires_at = ttl_secs
            .filter(|secs| *secs > 0)
            .and_then(|secs| now.checked_add(Duration::from_secs(secs)));
        self.family_mut(cf, now)
            .insert(key, RawEntry { value, expires_at });
    }

    pub(crate) fn delete(&mut self, cf: ColumnFamily, key: &Key, now: Instant) {
        self.family_mut(cf, now).remove(key);
    }

    pub(crate) fn delete_range(&mut self, cf: ColumnFamily, range: &BoundRange, now: Instant) {
        if range.is_empty() {
            return;
        }
        let family = self.family_mut(cf, now);
        let doomed: Vec<Key> = family.range(range.clone()).map(|(k, _)| k.clone()).collect();
        for key in doomed {
            family.remove(&key);
        }
    }

    pub(crate) fn scan(
        &self,
        cf: ColumnFamily,
        range: &BoundRange,
        limit: u32,
        key_only: bool,
        now: Instant,
    ) -> Vec<KvPair> {
        let Some(family) = self.family(cf) else {
            return Vec::new();
        };
        if range.is_empty() {
            return Vec::new();
        }
        family
            .range(range.clone())
            .filter(|(_, entry)| entry.is_live(now))
            .take(limit as usize)
            .map(|(key, entry)| {
                let value = if key_only { Vec::new() } else { entry.value.clone() };
                KvPair(key.clone(), value)
            })
            .collect()
    }

    /// Remaining whole seconds, rounded up so a live key never reports zero
    pub(crate) fn ttl_secs(&self, cf: ColumnFamily, key: &Key, now: Instant) -> Option<u64> {
        let entry = self.family(cf)?.get(key)?;
        let expires_at = entry.expires_at?;
        if expires_at <= now {
            return None;
        }
        let remaining = expires_at - now;
        let rounding = u64::from(remaining.subsec_nanos() > 0);
        Some(remaining.as_secs() + rounding)
    }
}
