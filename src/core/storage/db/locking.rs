// src/core/storage/db/locking.rs

//! The key lock table: a fixed array of 128 reader/writer locks used by
//! handlers that must serialize several map accesses against the same key
//! (e.g. `INCR`'s read-modify-write). This is deliberately a *separate*
//! structure from the keyspace's own per-shard locks in `shard.rs` -- those
//! guard raw storage, this one lets a handler hold a lock across a whole
//! multi-step operation. Different keys may collide on the same lock; that
//! only coarsens serialization, it never corrupts data.

use bytes::Bytes;
use std::collections::BTreeSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Size of the lock table. Intentionally much smaller than the shard count
/// or the expected key cardinality -- collisions are fine, deadlocks are not.
pub const LOCK_TABLE_SIZE: usize = 128;

pub struct KeyLockTable {
    locks: Vec<RwLock<()>>,
}

fn lock_index(key: &Bytes) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % LOCK_TABLE_SIZE
}

impl KeyLockTable {
    pub fn new() -> Self {
        let locks = (0..LOCK_TABLE_SIZE).map(|_| RwLock::new(())).collect();
        Self { locks }
    }

    pub async fn lock(&self, key: &Bytes) -> RwLockWriteGuard<'_, ()> {
        self.locks[lock_index(key)].write().await
    }

    pub async fn rlock(&self, key: &Bytes) -> RwLockReadGuard<'_, ()> {
        self.locks[lock_index(key)].read().await
    }

    /// Acquires write locks for every distinct index touched by `keys`, in
    /// ascending index order, so two operations with overlapping key sets can
    /// never deadlock against each other.
    pub async fn locks<'a>(&'a self, keys: &[Bytes]) -> Vec<RwLockWriteGuard<'a, ()>> {
        let indices: BTreeSet<usize> = keys.iter().map(lock_index).collect();
        let mut guards = Vec::with_capacity(indices.len());
        for idx in indices {
            guards.push(self.locks[idx].write().await);
        }
        guards
    }

    pub async fn rlocks<'a>(&'a self, keys: &[Bytes]) -> Vec<RwLockReadGuard<'a, ()>> {
        let indices: BTreeSet<usize> = keys.iter().map(lock_index).collect();
        let mut guards = Vec::with_capacity(indices.len());
        for idx in indices {
            guards.push(self.locks[idx].read().await);
        }
        guards
    }
}

impl Default for KeyLockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_index_is_stable() {
        let key = Bytes::from_static(b"same-key");
        assert_eq!(lock_index(&key), lock_index(&key));
    }

    #[tokio::test]
    async fn multi_key_lock_acquires_sorted_and_deduplicated() {
        let table = KeyLockTable::new();
        let keys = vec![
            Bytes::from_static(b"a"),
            Bytes::from_static(b"b"),
            Bytes::from_static(b"a"),
        ];
        let guards = table.locks(&keys).await;
        // "a" collapses with itself; at most as many guards as distinct indices.
        assert!(guards.len() <= 2);
    }
}
