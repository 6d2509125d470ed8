// src/core/persistence/aof_writer.rs

//! The AOF queue, its handle, and the single-consumer writer task.
//!
//! `pausingAof` is a `tokio::sync::RwLock<()>`: ordinary enqueues take the
//! read side (many can proceed concurrently), while `BGREWRITEAOF` briefly
//! takes the write side to snapshot the keyspace and swap in a fresh queue
//! atomically with respect to any enqueue that might otherwise land on the
//! old one after the snapshot is taken.
//!
//! `start` only opens the file; it does not open the queue or spawn the
//! writer task. That happens in `activate`, which callers invoke once
//! startup replay (if any) has finished. Until then `enqueue` is a no-op --
//! there is nowhere to send to -- which is what keeps replayed commands from
//! being re-appended to the very file they were just read from.

use crate::config::AppendFsync;
use crate::core::errors::FerroError;
use crate::core::metrics::Metrics;
use crate::core::protocol::RespFrame;
use parking_lot::{Mutex, RwLock as SyncRwLock};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock as AsyncRwLock};
use tracing::{error, warn};

pub struct AofHandle {
    pub(super) enabled: bool,
    pub(super) path: PathBuf,
    pub(super) fsync: AppendFsync,
    pub(super) sender: SyncRwLock<Option<mpsc::Sender<Vec<u8>>>>,
    pub(super) pausing: AsyncRwLock<()>,
    pub(super) queue_capacity: usize,
    file: Mutex<Option<std::fs::File>>,
}

impl AofHandle {
    /// Opens (or creates) the AOF file in append mode. When `enabled` is
    /// false the handle still exists -- `enqueue` and `activate` become
    /// no-ops -- so callers never have to branch on whether AOF is on. The
    /// queue itself is not opened and no writer task is spawned until
    /// `activate` is called.
    pub fn start(
        enabled: bool,
        path: PathBuf,
        fsync: AppendFsync,
        queue_capacity: usize,
    ) -> Result<Arc<AofHandle>, FerroError> {
        let file = if enabled { Some(open_append(&path)?) } else { None };
        Ok(Arc::new(AofHandle {
            enabled,
            path,
            fsync,
            sender: SyncRwLock::new(None),
            pausing: AsyncRwLock::new(()),
            queue_capacity,
            file: Mutex::new(file),
        }))
    }

    /// Opens the queue and spawns the writer task against the file `start`
    /// already opened. A no-op when AOF is disabled or when already
    /// activated. Callers must run this only after any startup replay has
    /// finished reading `path`.
    pub fn activate(&self, metrics: &'static Metrics) {
        if !self.enabled {
            return;
        }
        let Some(file) = self.file.lock().take() else {
            return;
        };
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        *self.sender.write() = Some(tx);
        tokio::spawn(run_writer(rx, file, self.fsync, metrics));
    }

    /// Enqueues `frame`'s wire encoding for the writer task. A no-op when
    /// AOF is disabled or not yet activated (e.g. during startup replay).
    /// Blocks (applying backpressure to the caller, and transitively to the
    /// client) when the queue is full, which is what keeps AOF order equal
    /// to commit order (I2).
    pub async fn enqueue(&self, frame: &RespFrame, metrics: &Metrics) -> Result<(), FerroError> {
        if !self.enabled {
            return Ok(());
        }
        let _guard = self.pausing.read().await;
        let Some(tx) = self.sender.read().clone() else {
            return Ok(());
        };
        let bytes = frame.encode_to_vec()?;
        metrics.aof_queue_depth.inc();
        if tx.send(bytes).await.is_err() {
            warn!("AOF writer task is gone; dropping frame");
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

fn open_append(path: &PathBuf) -> Result<std::fs::File, FerroError> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(FerroError::from)
}

pub(super) async fn run_writer(
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut file: std::fs::File,
    fsync: AppendFsync,
    metrics: &'static Metrics,
) {
    let mut since_fsync = 0usize;
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(bytes) = frame else {
                    let _ = file.sync_data();
                    return;
                };
                metrics.aof_queue_depth.dec();
                if let Err(e) = file.write_all(&bytes) {
                    error!(error = %e, "AOF write failed; continuing (availability over durability)");
                    continue;
                }
                since_fsync += 1;
                if fsync == AppendFsync::Always {
                    if let Err(e) = file.sync_data() {
                        error!(error = %e, "AOF fsync failed");
                    }
                    since_fsync = 0;
                }
            }
            _ = ticker.tick(), if fsync == AppendFsync::Everysec && since_fsync > 0 => {
                if let Err(e) = file.sync_data() {
                    error!(error = %e, "AOF periodic fsync failed");
                }
                since_fsync = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::METRICS;
    use bytes::Bytes;

    #[tokio::test]
    async fn disabled_handle_enqueue_is_a_no_op() {
        let handle = AofHandle::start(false, PathBuf::from("/tmp/unused.aof"), AppendFsync::No, 16).unwrap();
        let frame = RespFrame::command("set", [Bytes::from_static(b"k"), Bytes::from_static(b"v")]);
        handle.enqueue(&frame, &METRICS).await.unwrap();
    }

    #[tokio::test]
    async fn enqueue_before_activate_is_a_no_op_and_does_not_touch_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appendonly.aof");
        let handle = AofHandle::start(true, path.clone(), AppendFsync::Always, 16).unwrap();
        let frame = RespFrame::command("set", [Bytes::from_static(b"k"), Bytes::from_static(b"v")]);
        handle.enqueue(&frame, &METRICS).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let contents = std::fs::read(&path).unwrap();
        assert!(contents.is_empty());
    }

    #[tokio::test]
    async fn enabled_handle_writes_frames_to_disk_after_activate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appendonly.aof");
        let handle = AofHandle::start(true, path.clone(), AppendFsync::Always, 16).unwrap();
        handle.activate(&METRICS);
        let frame = RespFrame::command("set", [Bytes::from_static(b"k"), Bytes::from_static(b"v")]);
        handle.enqueue(&frame, &METRICS).await.unwrap();
        // Give the writer task a moment to drain the channel.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, frame.encode_to_vec().unwrap());
    }
}
