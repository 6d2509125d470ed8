// src/core/commands/mod.rs

//! The command surface: a typed `Command`, parsed once from the raw
//! argument vector, and the handlers it dispatches to.
//!
//! The original dispatches by re-parsing a raw argument vector inside each
//! handler; this implementation parses once into `Command` so the router
//! and the AOF serializer share one source of truth for argument validity
//! (see REDESIGN FLAGS in the design document).

mod keyspace;
mod numeric;
mod ttlcmd;

use crate::core::errors::FerroError;
use crate::core::protocol::RespFrame;
use crate::core::storage::db::Generation;
use bitflags::bitflags;
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::collections::HashMap;

bitflags! {
    /// Declared alongside each router entry, never derived dynamically
    /// (see §4.6): this is what tells `Exec` whether to enqueue the
    /// command's original argument vector onto the AOF after a successful
    /// call.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct CommandFlags: u8 {
        const WRITE = 0b0000_0001;
        const ADMIN = 0b0000_0010;
        const PUBSUB = 0b0000_0100;
    }
}

/// What a handler's mutation, if any, amounted to. `Exec` uses this both to
/// decide whether to enqueue to the AOF and to drive which metric to bump;
/// the AOF frame itself is always the original command, regardless of kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    DidNotWrite,
    Write,
    Delete,
    Flush,
}

/// One entry in the static router table: a command's name, its flags, and
/// the handler invoked with the already-typed arguments.
pub struct CommandSpec {
    pub flags: CommandFlags,
}

/// The static, process-wide command table, built once at startup and never
/// mutated, matching the teacher's use of `once_cell`/`lazy_static` for this
/// kind of table (see design notes, "Global `router`").
pub static ROUTER: Lazy<HashMap<&'static str, CommandSpec>> = Lazy::new(|| {
    let mut m = HashMap::new();
    let readonly = |name| (name, CommandSpec { flags: CommandFlags::empty() });
    let write = |name| (name, CommandSpec { flags: CommandFlags::WRITE });
    let admin = |name| (name, CommandSpec { flags: CommandFlags::ADMIN });
    let pubsub = |name| (name, CommandSpec { flags: CommandFlags::PUBSUB });

    for (name, spec) in [
        readonly("get"),
        write("set"),
        write("setnx"),
        write("setex"),
        write("del"),
        readonly("exists"),
        readonly("type"),
        write("rename"),
        readonly("keys"),
        write("flushdb"),
        write("expire"),
        write("pexpire"),
        write("expireat"),
        write("pexpireat"),
        readonly("ttl"),
        readonly("pttl"),
        write("persist"),
        write("incr"),
        write("decr"),
        readonly("ping"),
        readonly("select"),
        admin("bgrewriteaof"),
        pubsub("subscribe"),
        pubsub("unsubscribe"),
        pubsub("publish"),
    ] {
        m.insert(name, spec);
    }
    m
});

/// Arguments that still need validating before dispatch, parsed once from
/// the raw multi-bulk vector. Variants for `subscribe`/`unsubscribe`/
/// `publish`/`bgrewriteaof` exist so the AOF loader can round-trip them
/// through the same parser, even though `Exec` special-cases their live
/// dispatch (see design notes).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Select(Bytes),
    Get(Bytes),
    Set { key: Bytes, value: Bytes, nx: bool },
    Setex { key: Bytes, seconds: i64, value: Bytes },
    Del(Vec<Bytes>),
    Exists(Vec<Bytes>),
    Type(Bytes),
    Rename(Bytes, Bytes),
    Keys,
    Flushdb,
    Expire { key: Bytes, seconds: i64 },
    Pexpire { key: Bytes, millis: i64 },
    Expireat { key: Bytes, unix_seconds: i64 },
    Pexpireat { key: Bytes, unix_millis: i64 },
    Ttl(Bytes),
    Pttl(Bytes),
    Persist(Bytes),
    Incr(Bytes),
    Decr(Bytes),
    Subscribe(Vec<Bytes>),
    Unsubscribe(Vec<Bytes>),
    Publish(Bytes, Bytes),
    Bgrewriteaof,
}

fn arity_err(name: &str) -> FerroError {
    FerroError::WrongArity(name.to_string())
}

fn parse_int(b: &Bytes) -> Result<i64, FerroError> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(FerroError::NotAnInteger)
}

impl Command {
    /// Parses a lowercased command name and its remaining arguments into a
    /// typed `Command`. Returns `UnknownCommand` for names the router
    /// doesn't recognize, `WrongArity` for a recognized command given the
    /// wrong number of arguments.
    pub fn parse(name: &str, args: &[Bytes]) -> Result<Command, FerroError> {
        match name {
            "ping" => Ok(Command::Ping),
            "select" => match args {
                [idx] => Ok(Command::Select(idx.clone())),
                _ => Err(arity_err("select")),
            },
            "get" => match args {
                [key] => Ok(Command::Get(key.clone())),
                _ => Err(arity_err("get")),
            },
            "set" => match args {
                [key, value] => Ok(Command::Set { key: key.clone(), value: value.clone(), nx: false }),
                [key, value, flag] if flag.eq_ignore_ascii_case(b"nx") => {
                    Ok(Command::Set { key: key.clone(), value: value.clone(), nx: true })
                }
                _ => Err(arity_err("set")),
            },
            "setnx" => match args {
                [key, value] => Ok(Command::Set { key: key.clone(), value: value.clone(), nx: true }),
                _ => Err(arity_err("setnx")),
            },
            "setex" => match args {
                [key, seconds, value] => Ok(Command::Setex {
                    key: key.clone(),
                    seconds: parse_int(seconds)?,
                    value: value.clone(),
                }),
                _ => Err(arity_err("setex")),
            },
            "del" => {
                if args.is_empty() {
                    return Err(arity_err("del"));
                }
                Ok(Command::Del(args.to_vec()))
            }
            "exists" => {
                if args.is_empty() {
                    return Err(arity_err("exists"));
                }
                Ok(Command::Exists(args.to_vec()))
            }
            "type" => match args {
                [key] => Ok(Command::Type(key.clone())),
                _ => Err(arity_err("type")),
            },
            "rename" => match args {
                [src, dst] => Ok(Command::Rename(src.clone(), dst.clone())),
                _ => Err(arity_err("rename")),
            },
            "keys" => Ok(Command::Keys),
            "flushdb" => Ok(Command::Flushdb),
            "expire" => match args {
                [key, seconds] => Ok(Command::Expire { key: key.clone(), seconds: parse_int(seconds)? }),
                _ => Err(arity_err("expire")),
            },
            "pexpire" => match args {
                [key, millis] => Ok(Command::Pexpire { key: key.clone(), millis: parse_int(millis)? }),
                _ => Err(arity_err("pexpire")),
            },
            "expireat" => match args {
                [key, t] => Ok(Command::Expireat { key: key.clone(), unix_seconds: parse_int(t)? }),
                _ => Err(arity_err("expireat")),
            },
            "pexpireat" => match args {
                [key, t] => Ok(Command::Pexpireat { key: key.clone(), unix_millis: parse_int(t)? }),
                _ => Err(arity_err("pexpireat")),
            },
            "ttl" => match args {
                [key] => Ok(Command::Ttl(key.clone())),
                _ => Err(arity_err("ttl")),
            },
            "pttl" => match args {
                [key] => Ok(Command::Pttl(key.clone())),
                _ => Err(arity_err("pttl")),
            },
            "persist" => match args {
                [key] => Ok(Command::Persist(key.clone())),
                _ => Err(arity_err("persist")),
            },
            "incr" => match args {
                [key] => Ok(Command::Incr(key.clone())),
                _ => Err(arity_err("incr")),
            },
            "decr" => match args {
                [key] => Ok(Command::Decr(key.clone())),
                _ => Err(arity_err("decr")),
            },
            "subscribe" => {
                if args.is_empty() {
                    return Err(arity_err("subscribe"));
                }
                Ok(Command::Subscribe(args.to_vec()))
            }
            "unsubscribe" => Ok(Command::Unsubscribe(args.to_vec())),
            "publish" => match args {
                [channel, payload] => Ok(Command::Publish(channel.clone(), payload.clone())),
                _ => Err(arity_err("publish")),
            },
            "bgrewriteaof" => Ok(Command::Bgrewriteaof),
            other => Err(FerroError::UnknownCommand(other.to_string())),
        }
    }
}

/// Dispatches an already-parsed, already-validated command against a
/// snapshot of the keyspace. Returns the reply and what kind of mutation
/// (if any) occurred, which `Exec` uses to decide whether to enqueue to the
/// AOF and which metric to bump.
pub async fn dispatch(gen: &Generation, command: &Command) -> Result<(RespFrame, WriteOutcome), FerroError> {
    match command {
        Command::Ping => Ok((RespFrame::SimpleString("PONG".into()), WriteOutcome::DidNotWrite)),
        Command::Select(idx) => keyspace::select(idx),
        Command::Get(key) => keyspace::get(gen, key),
        Command::Set { key, value, nx } => keyspace::set(gen, key, value, *nx),
        Command::Setex { key, seconds, value } => keyspace::setex(gen, key, *seconds, value),
        Command::Del(keys) => keyspace::del(gen, keys),
        Command::Exists(keys) => keyspace::exists(gen, keys),
        Command::Type(key) => keyspace::type_of(gen, key),
        Command::Rename(src, dst) => keyspace::rename(gen, src, dst),
        Command::Keys => keyspace::keys(gen),
        Command::Flushdb => keyspace::flushdb(),
        Command::Expire { key, seconds } => ttlcmd::expire(gen, key, *seconds),
        Command::Pexpire { key, millis } => ttlcmd::pexpire(gen, key, *millis),
        Command::Expireat { key, unix_seconds } => ttlcmd::expireat(gen, key, *unix_seconds),
        Command::Pexpireat { key, unix_millis } => ttlcmd::pexpireat(gen, key, *unix_millis),
        Command::Ttl(key) => ttlcmd::ttl(gen, key),
        Command::Pttl(key) => ttlcmd::pttl(gen, key),
        Command::Persist(key) => ttlcmd::persist(gen, key),
        Command::Incr(key) => numeric::incr(gen, key, 1).await,
        Command::Decr(key) => numeric::incr(gen, key, -1).await,
        Command::Subscribe(_) | Command::Unsubscribe(_) | Command::Publish(_, _) | Command::Bgrewriteaof => {
            Err(FerroError::Internal(
                "pubsub/admin commands must be dispatched by Exec, not the generic router".into(),
            ))
        }
    }
}
