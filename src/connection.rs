// src/connection.rs

//! The connection handle contract the core depends on.
//!
//! The real read/write loop that owns a TCP socket is outside the core's
//! scope (see spec §1); what the core needs from it is just a cheap,
//! cloneable handle it can hand to the pub/sub hub and use to push frames
//! out-of-band from whatever command is currently executing on that
//! connection. `Connection` is that handle: an id plus a bounded outbox the
//! owning read/write loop drains and writes to the socket.

use crate::core::protocol::RespFrame;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Depth of a connection's outbox. Bounds how far a slow subscriber can fall
/// behind before `Publish` starts applying backpressure to the publisher.
pub const CONNECTION_OUTBOX_CAPACITY: usize = 128;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub type ConnId = u64;

/// A cloneable handle to one client connection's outgoing frame queue.
#[derive(Clone)]
pub struct Connection {
    pub id: ConnId,
    outbox: mpsc::Sender<RespFrame>,
}

impl Connection {
    /// Creates a connection handle and the receiver its read/write loop (or,
    /// in tests, a synthetic drainer) should poll for outgoing frames.
    pub fn new() -> (Self, mpsc::Receiver<RespFrame>) {
        let id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CONNECTION_OUTBOX_CAPACITY);
        (Connection { id, outbox: tx }, rx)
    }

    /// A connection handle with no live receiver, for commands executed
    /// without an originating client (AOF replay, `BGREWRITEAOF`'s snapshot
    /// pass). Any pub/sub traffic addressed to it is silently dropped.
    pub fn synthetic() -> Self {
        let (conn, rx) = Self::new();
        // Drop the receiver immediately; sends become no-ops (`send` returns
        // `Err`, which callers already treat as "subscriber gone").
        drop(rx);
        conn
    }

    /// Pushes a frame into this connection's outbox, awaiting capacity if
    /// it's currently full. This is the backpressure `Publish` relies on.
    pub async fn send(&self, frame: RespFrame) -> bool {
        self.outbox.send(frame).await.is_ok()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}
