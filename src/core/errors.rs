// src/core/errors.rs

//! The primary error type for the engine.

use std::sync::Arc;
use thiserror::Error;

/// All failures the engine can produce, from a malformed wire frame up to
/// a fatal startup condition. Every variant carries what it needs to render
/// the wire-level reply (or, for startup errors, a human-readable message)
/// without re-deriving context elsewhere.
#[derive(Error, Debug, Clone)]
pub enum FerroError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("ERR {0}")]
    InvalidArgument(String),

    #[error("ERR server is shutting down")]
    ShuttingDown,

    #[error("ERR persistence error: {0}")]
    Aof(String),

    #[error("ERR internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for FerroError {
    fn from(e: std::io::Error) -> Self {
        FerroError::Io(Arc::new(e))
    }
}

impl From<std::num::ParseIntError> for FerroError {
    fn from(_: std::num::ParseIntError) -> Self {
        FerroError::NotAnInteger
    }
}

impl FerroError {
    /// Renders the `-ERR ...` (or equivalent) line sent back to the client.
    /// Variants that already carry a leading error code are passed through verbatim;
    /// others are given a generic `ERR` prefix by their `Display` impl above.
    pub fn wire_message(&self) -> String {
        self.to_string()
    }
}
