// src/core/storage/db/shard.rs

//! A single shard of the keyspace: a plain `HashMap` behind a `parking_lot`
//! reader/writer lock. Lock scopes never cross an `.await`, so a synchronous
//! lock is the right tool -- it avoids the cost of an async mutex for what
//! is always a microseconds-long critical section.

use crate::core::storage::data_types::DataEntity;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Initial per-shard capacity, derived from the keyspace's overall
/// `dataDictSize = 2^16` target spread across `NUM_SHARDS`.
const INITIAL_SHARD_CAPACITY: usize = (1 << 16) / super::core::NUM_SHARDS;

#[derive(Debug, Default)]
pub struct KeyShard {
    map: RwLock<HashMap<Bytes, DataEntity>>,
}

impl KeyShard {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::with_capacity(INITIAL_SHARD_CAPACITY)),
        }
    }

    pub fn get(&self, key: &Bytes) -> Option<DataEntity> {
        self.map.read().get(key).cloned()
    }

    /// Inserts, returning 1 if the key was new and 0 if it replaced an existing entry.
    pub fn put(&self, key: Bytes, value: DataEntity) -> usize {
        match self.map.write().insert(key, value) {
            Some(_) => 0,
            None => 1,
        }
    }

    pub fn put_if_absent(&self, key: Bytes, value: DataEntity) -> usize {
        match self.map.write().entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => 0,
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(value);
                1
            }
        }
    }

    pub fn put_if_exists(&self, key: Bytes, value: DataEntity) -> usize {
        let mut guard = self.map.write();
        if guard.contains_key(&key) {
            guard.insert(key, value);
            1
        } else {
            0
        }
    }

    pub fn remove(&self, key: &Bytes) -> usize {
        if self.map.write().remove(key).is_some() {
            1
        } else {
            0
        }
    }

    pub fn contains(&self, key: &Bytes) -> bool {
        self.map.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Visits every (key, value) pair currently in this shard. Holds the
    /// shard's read lock only for the duration of this call; `f` returning
    /// `false` stops the traversal early.
    pub fn for_each(&self, mut f: impl FnMut(&Bytes, &DataEntity) -> bool) {
        for (k, v) in self.map.read().iter() {
            if !f(k, v) {
                break;
            }
        }
    }

    pub fn clear(&self) {
        self.map.write().clear();
    }
}
