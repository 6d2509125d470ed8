// src/core/storage/data_types.rs

//! The value cell the keyspace stores, and the tagged variant it wraps.

use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};

/// The supported value variants. The core enforces no schema beyond identity;
/// command handlers are responsible for matching on the variant they expect
/// and returning `WRONGTYPE` otherwise. Only `String` has executable command
/// coverage in this core (see Non-goals); the others exist so `TYPE` and the
/// data model are complete.
#[derive(Debug, Clone)]
pub enum DataValue {
    String(Bytes),
    List(VecDeque<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Set(HashSet<Bytes>),
    SortedSet(Vec<(Bytes, f64)>),
}

impl DataValue {
    /// The name `TYPE` reports for this variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::String(_) => "string",
            DataValue::List(_) => "list",
            DataValue::Hash(_) => "hash",
            DataValue::Set(_) => "set",
            DataValue::SortedSet(_) => "zset",
        }
    }
}

/// `DataEntity` is the opaque cell the keyspace owns per key. It carries no
/// expiry information itself -- that lives in the separate TTL index -- so
/// that a key's mortality can be changed without touching its value.
#[derive(Debug, Clone)]
pub struct DataEntity {
    pub data: DataValue,
}

impl DataEntity {
    pub fn new(data: DataValue) -> Self {
        Self { data }
    }

    pub fn as_string(&self) -> Option<&Bytes> {
        match &self.data {
            DataValue::String(b) => Some(b),
            _ => None,
        }
    }
}
