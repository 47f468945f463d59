use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use log::trace;

use crate::utils::{format_elapsed_time, lock};

/// A single address as seen by a snapshot or drain
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub address: IpAddr,
    pub last_seen: DateTime<Utc>,
    /// Time since `last_seen`, as of the snapshot
    pub age: Duration,
}

impl CacheEntry {
    /// An entry has expired once its age reaches the TTL
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.age >= ttl
    }
}

impl fmt::Display for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Entry {} age={}>",
            self.address,
            format_elapsed_time(self.age)
        )
    }
}

/// Tracks the last time each source address was observed
///
/// Shared between the ingestion loop (many small writes), the reconciler
/// and the drain path. The internal lock is only held for map operations,
/// never across route backend calls.
#[derive(Debug, Default)]
pub struct FreshnessCache {
    entries: Mutex<HashMap<IpAddr, DateTime<Utc>>>,
}

impl FreshnessCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity(64)),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, address: &IpAddr) -> bool {
        lock(&self.entries).contains_key(address)
    }

    pub fn last_seen(&self, address: &IpAddr) -> Option<DateTime<Utc>> {
        lock(&self.entries).get(address).copied()
    }

    /// Record that `address` was seen just now
    ///
    /// Returns true if the address was not already tracked.
    pub fn observe(&self, address: IpAddr) -> bool {
        self.observe_at(address, Utc::now())
    }

    /// Record that `address` was seen at `now`
    ///
    /// Timestamps never move backwards: an older `now` (e.g. after a wall
    /// clock step) leaves the stored value as-is.
    pub fn observe_at(&self, address: IpAddr, now: DateTime<Utc>) -> bool {
        let mut entries = lock(&self.entries);
        match entries.get_mut(&address) {
            Some(last_seen) => {
                if now > *last_seen {
                    *last_seen = now;
                }
                false
            }
            None => {
                entries.insert(address, now);
                true
            }
        }
    }

    pub fn snapshot(&self) -> Vec<CacheEntry> {
        self.snapshot_at(Utc::now())
    }

    /// Copy out every entry with its age relative to `now`
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<CacheEntry> {
        let entries = lock(&self.entries);
        entries
            .iter()
            .map(|(address, last_seen)| CacheEntry {
                address: *address,
                last_seen: *last_seen,
                age: now.signed_duration_since(*last_seen),
            })
            .collect()
    }

    /// Remove `address`, returns false if it was already gone
    pub fn remove(&self, address: &IpAddr) -> bool {
        lock(&self.entries).remove(address).is_some()
    }

    pub fn drain_all(&self) -> Vec<CacheEntry> {
        self.drain_all_at(Utc::now())
    }

    /// Remove and return every entry
    pub fn drain_all_at(&self, now: DateTime<Utc>) -> Vec<CacheEntry> {
        let drained: Vec<_> = lock(&self.entries)
            .drain()
            .map(|(address, last_seen)| CacheEntry {
                address,
                last_seen,
                age: now.signed_duration_since(last_seen),
            })
            .collect();
        trace!("Drained {} entries from cache", drained.len());
        drained
    }
}

impl fmt::Display for FreshnessCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<FreshnessCache entries={}>", self.len())
    }
}
