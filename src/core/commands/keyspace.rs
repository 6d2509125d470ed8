// src/core/commands/keyspace.rs

//! Handlers for the plain keyspace commands: `GET`, `SET`, `SETNX`,
//! `SETEX`, `DEL`, `EXISTS`, `TYPE`, `RENAME`, `KEYS`, `FLUSHDB`, `SELECT`.

use super::WriteOutcome;
use crate::core::errors::FerroError;
use crate::core::protocol::RespFrame;
use crate::core::storage::data_types::{DataEntity, DataValue};
use crate::core::storage::db::Generation;
use bytes::Bytes;
use std::time::{Duration, Instant};

/// A single-db server: any index other than 0 is rejected, matching the
/// teacher's stance toward `SELECT` on a non-sharded-by-db keyspace.
pub fn select(idx: &Bytes) -> Result<(RespFrame, WriteOutcome), FerroError> {
    match idx.as_ref() {
        b"0" => Ok((RespFrame::SimpleString("OK".into()), WriteOutcome::DidNotWrite)),
        _ => Err(FerroError::InvalidArgument("SELECT is only supported for database 0".into())),
    }
}

fn live(gen: &Generation, key: &Bytes) -> Option<DataEntity> {
    if gen.ttl.is_expired(key, &gen.keyspace) {
        return None;
    }
    gen.keyspace.get(key)
}

pub fn get(gen: &Generation, key: &Bytes) -> Result<(RespFrame, WriteOutcome), FerroError> {
    match live(gen, key) {
        Some(entity) => match entity.as_string() {
            Some(s) => Ok((RespFrame::BulkString(s.clone()), WriteOutcome::DidNotWrite)),
            None => Err(FerroError::WrongType),
        },
        None => Ok((RespFrame::Null, WriteOutcome::DidNotWrite)),
    }
}

pub fn set(gen: &Generation, key: &Bytes, value: &Bytes, nx: bool) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let entity = DataEntity::new(DataValue::String(value.clone()));
    if nx {
        // A logically-expired key must not block a fresh SET; evict it first.
        gen.ttl.is_expired(key, &gen.keyspace);
        let inserted = gen.keyspace.put_if_absent(key.clone(), entity);
        if inserted == 0 {
            return Ok((RespFrame::Null, WriteOutcome::DidNotWrite));
        }
    } else {
        gen.keyspace.put(key.clone(), entity);
    }
    gen.ttl.persist(key);
    Ok((RespFrame::SimpleString("OK".into()), WriteOutcome::Write))
}

pub fn setex(gen: &Generation, key: &Bytes, seconds: i64, value: &Bytes) -> Result<(RespFrame, WriteOutcome), FerroError> {
    if seconds <= 0 {
        return Err(FerroError::InvalidArgument("invalid expire time in 'setex' command".into()));
    }
    gen.keyspace.put(key.clone(), DataEntity::new(DataValue::String(value.clone())));
    gen.ttl.expire(key.clone(), Instant::now() + Duration::from_secs(seconds as u64));
    Ok((RespFrame::SimpleString("OK".into()), WriteOutcome::Write))
}

pub fn del(gen: &Generation, keys: &[Bytes]) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let mut removed = 0;
    for key in keys {
        gen.ttl.is_expired(key, &gen.keyspace);
        gen.ttl.persist(key);
        removed += gen.keyspace.remove(key);
    }
    let outcome = if removed > 0 { WriteOutcome::Delete } else { WriteOutcome::DidNotWrite };
    Ok((RespFrame::Integer(removed as i64), outcome))
}

pub fn exists(gen: &Generation, keys: &[Bytes]) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let count = keys.iter().filter(|k| live(gen, k).is_some()).count();
    Ok((RespFrame::Integer(count as i64), WriteOutcome::DidNotWrite))
}

pub fn type_of(gen: &Generation, key: &Bytes) -> Result<(RespFrame, WriteOutcome), FerroError> {
    match live(gen, key) {
        Some(entity) => Ok((RespFrame::SimpleString(entity.data.type_name().to_string()), WriteOutcome::DidNotWrite)),
        None => Ok((RespFrame::SimpleString("none".into()), WriteOutcome::DidNotWrite)),
    }
}

pub fn rename(gen: &Generation, src: &Bytes, dst: &Bytes) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let Some(entity) = live(gen, src) else {
        return Err(FerroError::InvalidArgument("no such key".into()));
    };
    let deadline = gen.ttl.peek(src);
    gen.keyspace.remove(src);
    gen.ttl.persist(src);
    gen.keyspace.put(dst.clone(), entity);
    match deadline {
        Some(d) => gen.ttl.expire(dst.clone(), d),
        None => {
            gen.ttl.persist(dst);
        }
    }
    Ok((RespFrame::SimpleString("OK".into()), WriteOutcome::Write))
}

pub fn keys(gen: &Generation) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let mut out = Vec::new();
    gen.keyspace.for_each(|k, _| {
        out.push(k.clone());
        true
    });
    let frame = RespFrame::Array(
        out.into_iter()
            .filter(|k| !gen.ttl.is_expired(k, &gen.keyspace))
            .map(RespFrame::BulkString)
            .collect(),
    );
    Ok((frame, WriteOutcome::DidNotWrite))
}

pub fn flushdb() -> Result<(RespFrame, WriteOutcome), FerroError> {
    // The actual swap happens in the executor, which owns the `Db` handle;
    // this handler only produces the reply and classification, since the
    // flush itself replaces the snapshot this function would otherwise act on.
    Ok((RespFrame::SimpleString("OK".into()), WriteOutcome::Flush))
}
