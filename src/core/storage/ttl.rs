// src/core/storage/ttl.rs

//! The TTL index and its background reaper.
//!
//! The index is sharded the same way the keyspace is, so per-key operations
//! never contend against unrelated keys. Expiry is observable two ways:
//! lazily, via `is_expired` on access, and actively, via the reaper below.

use super::db::{Db, Keyspace, NUM_SHARDS};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

fn shard_index(key: &Bytes) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % NUM_SHARDS
}

/// Initial per-shard capacity, derived from the TTL index's overall
/// `2^10` target spread across `NUM_SHARDS` -- an order of magnitude smaller
/// than the keyspace's own `dataDictSize`, since most keys never carry a
/// deadline.
const INITIAL_TTL_SHARD_CAPACITY: usize = (1 << 10) / NUM_SHARDS;

pub struct TtlIndex {
    shards: Arc<Vec<RwLock<HashMap<Bytes, Instant>>>>,
}

impl TtlIndex {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS)
            .map(|_| RwLock::new(HashMap::with_capacity(INITIAL_TTL_SHARD_CAPACITY)))
            .collect();
        Self {
            shards: Arc::new(shards),
        }
    }

    /// Sets (or overwrites) `key`'s absolute deadline.
    pub fn expire(&self, key: Bytes, deadline: Instant) {
        self.shards[shard_index(&key)].write().insert(key, deadline);
    }

    /// Removes `key`'s deadline, making it immortal again. Returns whether a
    /// deadline had been set.
    pub fn persist(&self, key: &Bytes) -> bool {
        self.shards[shard_index(key)].write().remove(key).is_some()
    }

    /// Reads the deadline without evicting anything, for `TTL`/`PTTL`.
    pub fn peek(&self, key: &Bytes) -> Option<Instant> {
        self.shards[shard_index(key)].read().get(key).copied()
    }

    /// Checks whether `key` has expired. If its deadline has passed, removes
    /// it from both the TTL index and the keyspace, atomically with respect
    /// to a concurrent `persist` on the same key (I5): the re-check happens
    /// under the same shard write lock as the removal, closing the window a
    /// naive read-then-remove would leave open.
    pub fn is_expired(&self, key: &Bytes, keyspace: &Keyspace) -> bool {
        let idx = shard_index(key);
        let mut shard = self.shards[idx].write();
        match shard.get(key) {
            Some(deadline) if *deadline <= Instant::now() => {
                shard.remove(key);
                drop(shard);
                keyspace.remove(key);
                crate::core::metrics::METRICS.expired_keys.inc();
                true
            }
            _ => false,
        }
    }

    /// One reap cycle: collects candidates whose deadline has passed (a
    /// cheap read-lock pass per shard), then, for each candidate, re-checks
    /// expiry under that shard's write lock before removing -- the same
    /// race-free discipline as `is_expired` -- before dropping the data row.
    /// The two-phase shape keeps the index from being mutated mid-iteration.
    pub fn reap_once(&self, keyspace: &Keyspace) -> usize {
        let mut removed = 0;
        for shard_lock in self.shards.iter() {
            let candidates: Vec<Bytes> = {
                let shard = shard_lock.read();
                let now = Instant::now();
                shard
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(k, _)| k.clone())
                    .collect()
            };
            if candidates.is_empty() {
                continue;
            }
            let mut shard = shard_lock.write();
            let now = Instant::now();
            for key in candidates {
                if matches!(shard.get(&key), Some(d) if *d <= now) {
                    shard.remove(&key);
                    keyspace.remove(&key);
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            crate::core::metrics::METRICS.expired_keys.inc_by(removed as u64);
        }
        removed
    }
}

impl Default for TtlIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task that actively reaps expired keys on a fixed interval, so
/// memory used by keys nobody ever touches again is eventually reclaimed.
pub struct Reaper {
    db: Arc<Db>,
    interval: Duration,
}

impl Reaper {
    pub fn new(db: Arc<Db>, interval: Duration) -> Self {
        Self { db, interval }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let gen = self.db.snapshot();
                    let removed = gen.ttl.reap_once(&gen.keyspace);
                    if removed > 0 {
                        debug!("reaper removed {} expired key(s)", removed);
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("reaper shutting down");
                    return;
                }
            }
        }
    }
}
