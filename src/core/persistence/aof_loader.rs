// src/core/persistence/aof_loader.rs

//! Startup replay: reads an existing AOF file frame by frame and dispatches
//! each through the normal `Exec` path with a synthetic connection, to
//! rebuild state before the server starts accepting real clients.
//!
//! Commands that failed originally were never written (see `executor`), so
//! replay cannot produce an outcome the original execution didn't already
//! commit to.

use crate::connection::Connection;
use crate::core::errors::FerroError;
use crate::core::executor::exec;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::state::ServerState;
use bytes::BytesMut;
use std::path::Path;
use tokio_util::codec::Decoder;
use tracing::{info, warn};

/// Replays `path` if it exists, returning the number of frames applied.
/// A missing file is not an error -- there's simply nothing to replay yet.
pub async fn replay(state: &ServerState, path: &Path) -> Result<usize, FerroError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(FerroError::from(e)),
    };

    let mut buf = BytesMut::from(&bytes[..]);
    let mut codec = RespFrameCodec;
    let synthetic = Connection::synthetic();
    let mut applied = 0;

    loop {
        let frame = match codec.decode(&mut buf) {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "AOF replay stopped at a malformed frame");
                break;
            }
        };
        let RespFrame::Array(items) = frame else {
            warn!("AOF contains a non-command frame; skipping");
            continue;
        };
        let args: Vec<bytes::Bytes> = items
            .into_iter()
            .filter_map(|f| match f {
                RespFrame::BulkString(b) => Some(b),
                _ => None,
            })
            .collect();
        if args.is_empty() {
            continue;
        }
        if let Err(e) = exec(state, &synthetic, args).await {
            warn!(error = %e, "AOF replay command failed; continuing with next frame");
        } else {
            applied += 1;
        }
    }

    info!(applied, path = %path.display(), "AOF replay complete");
    Ok(applied)
}
