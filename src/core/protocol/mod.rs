// src/core/protocol/mod.rs

//! A minimal RESP2 frame codec: just enough wire protocol to drive the
//! engine end to end (accept a command, emit a reply, round-trip an AOF
//! frame). Parsing richer reply types (RESP3 maps, doubles, ...) is left to
//! the full client-facing protocol layer this core does not own.

mod resp;

pub use resp::{RespFrame, RespFrameCodec};
