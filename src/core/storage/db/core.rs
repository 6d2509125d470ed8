// src/core/storage/db/core.rs

//! `Keyspace`: the sharded concurrent map described in the data model. It
//! provides single-key operations with no external locking, and the
//! multi-shard primitives (`for_each`, `clear_all`) that admin commands and
//! the reaper build on.
//!
//! `Db` wraps a `Keyspace` together with the TTL index and key lock table
//! that share its lifetime, and is the thing `Flush` actually replaces. See
//! `flush` for how invariant I3 (no torn keyspace during flush) is upheld.

use super::locking::KeyLockTable;
use super::shard::KeyShard;
use crate::core::storage::data_types::DataEntity;
use crate::core::storage::ttl::TtlIndex;
use bytes::Bytes;
use parking_lot::RwLock;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

/// Number of independent shards. A power of two so `% NUM_SHARDS` is cheap
/// and so shard indices can double as a stable, total lock-acquisition order.
pub const NUM_SHARDS: usize = 16;

#[derive(Clone)]
pub struct Keyspace {
    shards: Arc<Vec<KeyShard>>,
}

fn shard_index(key: &Bytes) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % NUM_SHARDS
}

impl Keyspace {
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| KeyShard::new()).collect();
        Self {
            shards: Arc::new(shards),
        }
    }

    pub fn shard_index(key: &Bytes) -> usize {
        shard_index(key)
    }

    pub fn shard(&self, index: usize) -> &KeyShard {
        &self.shards[index]
    }

    pub fn get(&self, key: &Bytes) -> Option<DataEntity> {
        self.shards[shard_index(key)].get(key)
    }

    pub fn put(&self, key: Bytes, value: DataEntity) -> usize {
        let idx = shard_index(&key);
        self.shards[idx].put(key, value)
    }

    pub fn put_if_absent(&self, key: Bytes, value: DataEntity) -> usize {
        let idx = shard_index(&key);
        self.shards[idx].put_if_absent(key, value)
    }

    pub fn put_if_exists(&self, key: Bytes, value: DataEntity) -> usize {
        let idx = shard_index(&key);
        self.shards[idx].put_if_exists(key, value)
    }

    pub fn remove(&self, key: &Bytes) -> usize {
        self.shards[shard_index(key)].remove(key)
    }

    pub fn contains(&self, key: &Bytes) -> bool {
        self.shards[shard_index(key)].contains(key)
    }

    /// Deletes every key in `keys`, returning the number actually present.
    pub fn del_many(&self, keys: &[Bytes]) -> usize {
        keys.iter().map(|k| self.remove(k)).sum()
    }

    pub fn key_count(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    /// Visits every live key across every shard. Each shard's read lock is
    /// held only for that shard's traversal, so entries in a shard not yet
    /// visited reflect whatever concurrent writers do to them meanwhile --
    /// this is a live walk, not a snapshot.
    pub fn for_each(&self, mut f: impl FnMut(&Bytes, &DataEntity) -> bool) {
        let mut stop = false;
        for shard in self.shards.iter() {
            if stop {
                break;
            }
            shard.for_each(|k, v| {
                if !f(k, v) {
                    stop = true;
                    false
                } else {
                    true
                }
            });
        }
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything `Flush` replaces as one atomic unit: the keyspace, the TTL
/// index, and the key lock table. Bundling them means a flush is a single
/// pointer swap rather than three independent resets that a reader could
/// observe mid-transition.
pub struct Generation {
    pub keyspace: Keyspace,
    pub ttl: TtlIndex,
    pub locks: KeyLockTable,
}

impl Generation {
    fn new() -> Self {
        Self {
            keyspace: Keyspace::new(),
            ttl: TtlIndex::new(),
            locks: KeyLockTable::new(),
        }
    }
}

/// `Db` is the stop-the-world barrier described in §5: instead of a counter
/// readers wait on, every accessor takes a cheap snapshot `Arc<Generation>`
/// under `generation`'s read lock before touching any shard. `flush`
/// replaces the whole `Arc` under the write lock in one atomic step, so a
/// snapshot taken a moment earlier is guaranteed to be entirely pre-flush or
/// entirely post-flush -- never a mix (invariant I3).
pub struct Db {
    generation: RwLock<Arc<Generation>>,
}

impl Db {
    pub fn new() -> Self {
        Self {
            generation: RwLock::new(Arc::new(Generation::new())),
        }
    }

    /// Takes a cheap, consistent view of the keyspace/TTL/lock-table triple.
    /// Command handlers should call this once per command and operate on the
    /// returned snapshot for the rest of their execution.
    pub fn snapshot(&self) -> Arc<Generation> {
        self.generation.read().clone()
    }

    /// Atomically replaces the keyspace, TTL index, and lock table with
    /// fresh, empty instances. Implements `FLUSHDB`.
    pub fn flush(&self) {
        let fresh = Arc::new(Generation::new());
        *self.generation.write() = fresh;
    }
}

impl Default for Db {
    fn default() -> Self {
        Self::new()
    }
}
