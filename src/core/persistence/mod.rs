// src/core/persistence/mod.rs

//! The append-only-file persistence pipeline: a bounded queue, a
//! single-consumer writer task, `BGREWRITEAOF`, and startup replay.

mod aof_loader;
mod aof_rewriter;
mod aof_writer;

pub use aof_loader::replay;
pub use aof_rewriter::bgrewriteaof;
pub use aof_writer::AofHandle;
