// src/server.rs

//! A thin TCP acceptor wiring the RESP2 codec, a `Connection` handle, and
//! `Exec` together. Implemented only to the depth needed to exercise the
//! core through a real accepted connection -- not a general-purpose
//! protocol-layer server (see spec §1).

use crate::connection::Connection;
use crate::core::errors::FerroError;
use crate::core::executor::exec;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::state::ServerState;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{info, warn};

/// Accepts connections on `state.config.bind:port` until `shutdown_rx`
/// fires. Each accepted socket gets its own task; one command is read and
/// answered at a time, which is what gives same-connection commands their
/// arrival-order guarantee (§5).
pub async fn run(state: Arc<ServerState>, mut shutdown_rx: broadcast::Receiver<()>) -> Result<(), FerroError> {
    let addr = format!("{}:{}", state.config.bind, state.config.port);
    let listener = TcpListener::bind(&addr).await.map_err(FerroError::from)?;
    info!(%addr, "listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = accepted.map_err(FerroError::from)?;
                let state = state.clone();
                let conn_shutdown = shutdown_rx.resubscribe();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(state, socket, conn_shutdown).await {
                        warn!(%peer, error = %e, "connection closed with error");
                    }
                });
            }
            _ = shutdown_rx.recv() => {
                info!("acceptor shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    state: Arc<ServerState>,
    socket: tokio::net::TcpStream,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), FerroError> {
    let mut framed = Framed::new(socket, RespFrameCodec);
    let (conn, mut outbox) = Connection::new();

    loop {
        tokio::select! {
            // Pub/sub messages addressed to this connection, delivered
            // out-of-band from whatever command this loop is between.
            frame = outbox.recv() => {
                let Some(frame) = frame else { continue };
                if framed.send(frame).await.is_err() {
                    break;
                }
            }
            next = framed.next() => {
                let Some(decoded) = next else { break };
                let frame = decoded?;
                let RespFrame::Array(items) = frame else {
                    framed.send(RespFrame::Error(
                        "ERR expected a multi-bulk command".into(),
                    )).await.ok();
                    continue;
                };
                let args: Vec<bytes::Bytes> = items
                    .into_iter()
                    .filter_map(|f| match f {
                        RespFrame::BulkString(b) => Some(b),
                        _ => None,
                    })
                    .collect();
                let reply = match exec(&state, &conn, args).await {
                    Ok(reply) => reply,
                    Err(e) => RespFrame::Error(e.wire_message()),
                };
                if framed.send(reply).await.is_err() {
                    break;
                }
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    state.pubsub.unsubscribe_all(conn.id);
    Ok(())
}
