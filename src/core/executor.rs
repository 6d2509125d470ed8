// src/core/executor.rs

//! `Exec`: the top-level dispatch entry point every connection calls with
//! its decoded argument vector. Installs the panic barrier, routes the
//! subscription family and `bgrewriteaof` directly, and enqueues successful
//! mutations to the AOF after the handler returns.

use crate::connection::Connection;
use crate::core::commands::{self, Command, CommandFlags, WriteOutcome, ROUTER};
use crate::core::errors::FerroError;
use crate::core::protocol::RespFrame;
use crate::core::state::ServerState;
use crate::core::storage::db::Generation;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info_span, Instrument};

/// Runs a single already-parsed command against a keyspace snapshot inside
/// its own task. Spawning it means a handler panic surfaces as a
/// `JoinError` instead of unwinding through the caller -- the Rust-idiomatic
/// substitute for a `catch_unwind`-based barrier, which would be unsound
/// across the `.await` points some handlers (`INCR`/`DECR`) have.
async fn run_isolated(gen: Arc<Generation>, command: Command) -> Result<(RespFrame, WriteOutcome), FerroError> {
    tokio::spawn(async move { commands::dispatch(&gen, &command).await })
        .await
        .unwrap_or_else(|join_err| {
            error!(error = %join_err, "command handler panicked");
            Ok((RespFrame::Error("ERR unknown error".into()), WriteOutcome::DidNotWrite))
        })
}

async fn dispatch_and_persist(
    state: &ServerState,
    name: &str,
    args: Vec<Bytes>,
) -> Result<RespFrame, FerroError> {
    let command = match Command::parse(name, &args) {
        Ok(c) => c,
        Err(e) => return Ok(RespFrame::Error(e.wire_message())),
    };

    let gen = state.db.snapshot();
    let (reply, outcome) = run_isolated(gen, command).await?;

    let Some(spec) = ROUTER.get(name) else {
        return Ok(reply);
    };
    let is_error = matches!(reply, RespFrame::Error(_));
    if spec.flags.contains(CommandFlags::WRITE) && !is_error && outcome != WriteOutcome::DidNotWrite {
        if outcome == WriteOutcome::Flush {
            state.db.flush();
        }
        let frame = RespFrame::command(name, args);
        if let Err(e) = state.aof.enqueue(&frame, state.metrics).await {
            error!(error = %e, command = name, "failed to enqueue command to the AOF");
        }
    }

    Ok(reply)
}

async fn handle_subscribe(state: &ServerState, conn: &Connection, channels: Vec<Bytes>) -> RespFrame {
    let acks = state.pubsub.subscribe(conn, &channels);
    let replies = acks
        .into_iter()
        .map(|(channel, count)| {
            RespFrame::Array(vec![
                RespFrame::BulkString(Bytes::from_static(b"subscribe")),
                RespFrame::BulkString(channel),
                RespFrame::Integer(count as i64),
            ])
        })
        .collect();
    RespFrame::Array(replies)
}

async fn handle_unsubscribe(state: &ServerState, conn: &Connection, channels: Vec<Bytes>) -> RespFrame {
    let acks = state.pubsub.unsubscribe(conn, &channels);
    let replies = acks
        .into_iter()
        .map(|(channel, count)| {
            RespFrame::Array(vec![
                RespFrame::BulkString(Bytes::from_static(b"unsubscribe")),
                RespFrame::BulkString(channel),
                RespFrame::Integer(count as i64),
            ])
        })
        .collect();
    RespFrame::Array(replies)
}

async fn handle_publish(state: &ServerState, channel: Bytes, payload: Bytes) -> RespFrame {
    let delivered = state.pubsub.publish(&channel, payload).await;
    RespFrame::Integer(delivered as i64)
}

async fn handle_bgrewriteaof(state: &ServerState) -> RespFrame {
    match crate::core::persistence::bgrewriteaof(state).await {
        Ok(()) => RespFrame::SimpleString("Background append only file rewriting started".into()),
        Err(e) => RespFrame::Error(e.wire_message()),
    }
}

/// The entry point every connection (real or synthetic, during AOF replay)
/// calls with a decoded argument vector. Returns `Err` only for malformed
/// input at the dispatch boundary itself (an empty vector); everything a
/// handler rejects comes back as `Ok(RespFrame::Error(..))` so the
/// connection stays open, per §7.
pub async fn exec(state: &ServerState, conn: &Connection, args: Vec<Bytes>) -> Result<RespFrame, FerroError> {
    if args.is_empty() {
        return Err(FerroError::Protocol("empty command".into()));
    }
    let name = String::from_utf8_lossy(&args[0]).to_lowercase();
    let rest: Vec<Bytes> = args[1..].to_vec();

    state.metrics.commands_processed.inc();
    let span = info_span!("command", name = %name, client.id = conn.id);

    async {
        let reply = match name.as_str() {
            "subscribe" => {
                if rest.is_empty() {
                    RespFrame::Error(FerroError::WrongArity("subscribe".into()).wire_message())
                } else {
                    handle_subscribe(state, conn, rest).await
                }
            }
            "unsubscribe" => handle_unsubscribe(state, conn, rest).await,
            "publish" => match rest.as_slice() {
                [channel, payload] => handle_publish(state, channel.clone(), payload.clone()).await,
                _ => RespFrame::Error(FerroError::WrongArity("publish".into()).wire_message()),
            },
            "bgrewriteaof" => handle_bgrewriteaof(state).await,
            _ => dispatch_and_persist(state, &name, rest).await?,
        };

        Ok(reply)
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppendFsync, Config};
    use crate::core::persistence::AofHandle;
    use crate::core::pubsub::PubSubHub;
    use crate::core::storage::db::Db;

    fn test_state() -> ServerState {
        let db = Arc::new(Db::new());
        let pubsub = Arc::new(PubSubHub::new());
        let aof = AofHandle::start(false, "/tmp/unused.aof".into(), AppendFsync::No, 16).unwrap();
        ServerState::new(db, pubsub, aof, Config::default())
    }

    #[tokio::test]
    async fn empty_command_is_a_protocol_error() {
        let state = test_state();
        let (conn, _rx) = Connection::new();
        assert!(exec(&state, &conn, vec![]).await.is_err());
    }

    #[tokio::test]
    async fn unknown_command_returns_err_reply_and_keeps_connection_open() {
        let state = test_state();
        let (conn, _rx) = Connection::new();
        let reply = exec(&state, &conn, vec![Bytes::from_static(b"FOOBAR")]).await.unwrap();
        assert_eq!(reply, RespFrame::Error("ERR unknown command 'foobar'".into()));
    }

    #[tokio::test]
    async fn set_then_get_through_exec() {
        let state = test_state();
        let (conn, _rx) = Connection::new();
        let reply = exec(
            &state,
            &conn,
            vec![Bytes::from_static(b"SET"), Bytes::from_static(b"k"), Bytes::from_static(b"v")],
        )
        .await
        .unwrap();
        assert_eq!(reply, RespFrame::SimpleString("OK".into()));

        let reply = exec(&state, &conn, vec![Bytes::from_static(b"GET"), Bytes::from_static(b"k")])
            .await
            .unwrap();
        assert_eq!(reply, RespFrame::BulkString(Bytes::from_static(b"v")));
    }

    #[tokio::test]
    async fn flushdb_empties_the_keyspace() {
        let state = test_state();
        let (conn, _rx) = Connection::new();
        exec(&state, &conn, vec![Bytes::from_static(b"SET"), Bytes::from_static(b"k"), Bytes::from_static(b"v")])
            .await
            .unwrap();
        exec(&state, &conn, vec![Bytes::from_static(b"FLUSHDB")]).await.unwrap();
        let reply = exec(&state, &conn, vec![Bytes::from_static(b"GET"), Bytes::from_static(b"k")])
            .await
            .unwrap();
        assert_eq!(reply, RespFrame::Null);
    }

    #[tokio::test]
    async fn subscribe_then_publish_delivers_a_message_frame() {
        let state = test_state();
        let (sub_conn, mut rx) = Connection::new();
        exec(&state, &sub_conn, vec![Bytes::from_static(b"SUBSCRIBE"), Bytes::from_static(b"ch")])
            .await
            .unwrap();

        let (pub_conn, _pub_rx) = Connection::new();
        let reply = exec(
            &state,
            &pub_conn,
            vec![Bytes::from_static(b"PUBLISH"), Bytes::from_static(b"ch"), Bytes::from_static(b"hi")],
        )
        .await
        .unwrap();
        assert_eq!(reply, RespFrame::Integer(1));

        let delivered = rx.try_recv().unwrap();
        assert_eq!(
            delivered,
            RespFrame::Array(vec![
                RespFrame::BulkString(Bytes::from_static(b"message")),
                RespFrame::BulkString(Bytes::from_static(b"ch")),
                RespFrame::BulkString(Bytes::from_static(b"hi")),
            ])
        );
    }
}
