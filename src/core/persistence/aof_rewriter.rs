// src/core/persistence/aof_rewriter.rs

//! `BGREWRITEAOF`: replaces the AOF with a minimal reconstruction of the
//! current keyspace, without dropping commands that arrive while the
//! rewrite is in flight.
//!
//! The write side of `pausingAof` is held only long enough to snapshot the
//! keyspace and swap in a fresh queue -- never for the full rewrite -- so
//! command execution is never blocked longer than that snapshot (§4.5).
//! Everything enqueued after the swap lands on the new queue, which this
//! module drains into the rewritten file once it exists, becoming the
//! ongoing writer from that point on. The old writer task keeps draining
//! whatever was already in its queue, writing to the old file, and exits on
//! its own once every clone of its sender has been dropped.

use crate::core::errors::FerroError;
use crate::core::protocol::RespFrame;
use crate::core::state::ServerState;
use std::io::Write;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::info;

fn unix_millis_from_instant(deadline: Instant) -> i64 {
    let now_instant = Instant::now();
    let now_unix = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let target_unix = if deadline >= now_instant {
        now_unix + (deadline - now_instant)
    } else {
        now_unix
            .checked_sub(now_instant - deadline)
            .unwrap_or_default()
    };
    target_unix.as_millis() as i64
}

pub async fn bgrewriteaof(state: &ServerState) -> Result<(), FerroError> {
    if !state.aof.is_enabled() {
        return Ok(());
    }

    let (new_tx, new_rx) = mpsc::channel(state.aof.queue_capacity);
    let snapshot = {
        let _guard = state.aof.pausing.write().await;
        let snapshot = state.db.snapshot();
        *state.aof.sender.write() = Some(new_tx);
        snapshot
    };

    let tmp_path = state.aof.path.with_extension("aof.rewrite.tmp");
    let write_result: Result<(), FerroError> = (|| {
        let mut tmp = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        let mut io_err = None;
        snapshot.keyspace.for_each(|key, entity| {
            let Some(value) = entity.as_string() else {
                return true;
            };
            let set_frame = RespFrame::command("set", [key.clone(), value.clone()]);
            if let Err(e) = set_frame.encode_to_vec().and_then(|b| tmp.write_all(&b).map_err(FerroError::from)) {
                io_err = Some(e);
                return false;
            }
            if let Some(deadline) = snapshot.ttl.peek(key) {
                let millis = unix_millis_from_instant(deadline);
                let expire_frame =
                    RespFrame::command("pexpireat", [key.clone(), bytes::Bytes::from(millis.to_string())]);
                if let Err(e) = expire_frame.encode_to_vec().and_then(|b| tmp.write_all(&b).map_err(FerroError::from)) {
                    io_err = Some(e);
                    return false;
                }
            }
            true
        });
        if let Some(e) = io_err {
            return Err(e);
        }
        tmp.sync_data()?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    std::fs::rename(&tmp_path, &state.aof.path).map_err(FerroError::from)?;

    let file = std::fs::OpenOptions::new()
        .append(true)
        .open(&state.aof.path)
        .map_err(FerroError::from)?;
    info!("AOF rewrite complete, resuming writer against the rewritten file");
    tokio::spawn(super::aof_writer::run_writer(new_rx, file, state.aof.fsync, state.metrics));
    Ok(())
}
