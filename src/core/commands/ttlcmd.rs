// src/core/commands/ttlcmd.rs

//! Handlers for the TTL family: `EXPIRE`, `PEXPIRE`, `EXPIREAT`,
//! `PEXPIREAT`, `TTL`, `PTTL`, `PERSIST`.

use super::WriteOutcome;
use crate::core::errors::FerroError;
use crate::core::protocol::RespFrame;
use crate::core::storage::db::Generation;
use bytes::Bytes;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

fn set_deadline(gen: &Generation, key: &Bytes, deadline: Instant) -> Result<(RespFrame, WriteOutcome), FerroError> {
    if gen.ttl.is_expired(key, &gen.keyspace) || !gen.keyspace.contains(key) {
        return Ok((RespFrame::Integer(0), WriteOutcome::DidNotWrite));
    }
    gen.ttl.expire(key.clone(), deadline);
    Ok((RespFrame::Integer(1), WriteOutcome::Write))
}

/// Converts a Unix timestamp expressed in `unit`s-since-epoch into an
/// `Instant` by anchoring through the current wall-clock offset. Deadlines
/// already in the past map to an `Instant` that is immediately expired.
fn instant_from_unix(duration_since_epoch: Duration) -> Instant {
    let now_unix = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let now = Instant::now();
    if duration_since_epoch >= now_unix {
        now + (duration_since_epoch - now_unix)
    } else {
        now.checked_sub(now_unix - duration_since_epoch).unwrap_or(now)
    }
}

pub fn expire(gen: &Generation, key: &Bytes, seconds: i64) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let deadline = if seconds <= 0 {
        Instant::now()
    } else {
        Instant::now() + Duration::from_secs(seconds as u64)
    };
    set_deadline(gen, key, deadline)
}

pub fn pexpire(gen: &Generation, key: &Bytes, millis: i64) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let deadline = if millis <= 0 {
        Instant::now()
    } else {
        Instant::now() + Duration::from_millis(millis as u64)
    };
    set_deadline(gen, key, deadline)
}

pub fn expireat(gen: &Generation, key: &Bytes, unix_seconds: i64) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let deadline = instant_from_unix(Duration::from_secs(unix_seconds.max(0) as u64));
    set_deadline(gen, key, deadline)
}

pub fn pexpireat(gen: &Generation, key: &Bytes, unix_millis: i64) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let deadline = instant_from_unix(Duration::from_millis(unix_millis.max(0) as u64));
    set_deadline(gen, key, deadline)
}

/// Shared by `TTL`/`PTTL`: -2 if the key doesn't exist, -1 if it exists but
/// has no TTL, otherwise the remaining duration.
fn remaining(gen: &Generation, key: &Bytes) -> Option<Option<Duration>> {
    if gen.ttl.is_expired(key, &gen.keyspace) || !gen.keyspace.contains(key) {
        return None;
    }
    Some(gen.ttl.peek(key).map(|deadline| deadline.saturating_duration_since(Instant::now())))
}

pub fn ttl(gen: &Generation, key: &Bytes) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let reply = match remaining(gen, key) {
        None => RespFrame::Integer(-2),
        Some(None) => RespFrame::Integer(-1),
        Some(Some(d)) => RespFrame::Integer(d.as_secs() as i64),
    };
    Ok((reply, WriteOutcome::DidNotWrite))
}

pub fn pttl(gen: &Generation, key: &Bytes) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let reply = match remaining(gen, key) {
        None => RespFrame::Integer(-2),
        Some(None) => RespFrame::Integer(-1),
        Some(Some(d)) => RespFrame::Integer(d.as_millis() as i64),
    };
    Ok((reply, WriteOutcome::DidNotWrite))
}

pub fn persist(gen: &Generation, key: &Bytes) -> Result<(RespFrame, WriteOutcome), FerroError> {
    if gen.ttl.is_expired(key, &gen.keyspace) || !gen.keyspace.contains(key) {
        return Ok((RespFrame::Integer(0), WriteOutcome::DidNotWrite));
    }
    let had_ttl = gen.ttl.persist(key);
    let outcome = if had_ttl { WriteOutcome::Write } else { WriteOutcome::DidNotWrite };
    Ok((RespFrame::Integer(had_ttl as i64), outcome))
}
