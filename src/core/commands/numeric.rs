// src/core/commands/numeric.rs

//! `INCR`/`DECR`: the key-lock-table-exercising commands added to the
//! surface beyond §6 (see REDESIGN FLAGS) -- `GET`/`SET` alone can't
//! demonstrate a read-modify-write race, so there was nothing in the named
//! surface for the key lock table or property P5 to exercise.

use super::WriteOutcome;
use crate::core::errors::FerroError;
use crate::core::protocol::RespFrame;
use crate::core::storage::data_types::{DataEntity, DataValue};
use crate::core::storage::db::Generation;
use bytes::Bytes;

/// Applies `delta` (+1 for `INCR`, -1 for `DECR`) to the integer stored at
/// `key`, creating it as `0` first if absent. Holds the key lock for the
/// whole read-modify-write so concurrent incrementers serialize instead of
/// racing on the shard's own, much shorter-held, per-op lock.
pub async fn incr(gen: &Generation, key: &Bytes, delta: i64) -> Result<(RespFrame, WriteOutcome), FerroError> {
    let _guard = gen.locks.lock(key).await;

    if gen.ttl.is_expired(key, &gen.keyspace) {
        gen.ttl.persist(key);
    }

    let current = match gen.keyspace.get(key) {
        Some(entity) => {
            let s = entity.as_string().ok_or(FerroError::WrongType)?;
            std::str::from_utf8(s)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(FerroError::NotAnInteger)?
        }
        None => 0,
    };

    let updated = current.checked_add(delta).ok_or(FerroError::Overflow)?;
    gen.keyspace.put(
        key.clone(),
        DataEntity::new(DataValue::String(Bytes::from(updated.to_string()))),
    );
    Ok((RespFrame::Integer(updated), WriteOutcome::Write))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::db::Db;
    use std::sync::Arc;

    #[tokio::test]
    async fn incr_on_missing_key_starts_at_one() {
        let db = Db::new();
        let gen = db.snapshot();
        let (reply, outcome) = incr(&gen, &Bytes::from_static(b"counter"), 1).await.unwrap();
        assert_eq!(reply, RespFrame::Integer(1));
        assert_eq!(outcome, WriteOutcome::Write);
    }

    #[tokio::test]
    async fn decr_subtracts() {
        let db = Db::new();
        let gen = db.snapshot();
        let key = Bytes::from_static(b"counter");
        incr(&gen, &key, 1).await.unwrap();
        let (reply, _) = incr(&gen, &key, -1).await.unwrap();
        assert_eq!(reply, RespFrame::Integer(0));
    }

    #[tokio::test]
    async fn concurrent_increments_from_many_tasks_sum_correctly() {
        let db = Arc::new(Db::new());
        let key = Bytes::from_static(b"hits");
        let connections = 8;
        let per_connection = 50;

        let mut handles = Vec::new();
        for _ in 0..connections {
            let db = db.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..per_connection {
                    let gen = db.snapshot();
                    incr(&gen, &key, 1).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let gen = db.snapshot();
        let (reply, _) = incr(&gen, &key, 0).await.unwrap_or((RespFrame::Integer(-1), WriteOutcome::DidNotWrite));
        // incr with delta 0 still goes through the normal path and reports the current value.
        assert_eq!(reply, RespFrame::Integer((connections * per_connection) as i64));
    }
}
