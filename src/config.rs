// src/config.rs

//! Server configuration: loaded once at startup from a TOML file layered
//! with `APP_`-prefixed environment overrides, then frozen for the life of
//! the process. Unlike the teacher's `Config`, which lives behind
//! `Arc<Mutex<_>>` so `CONFIG SET` can mutate it live, nothing in this
//! core's command surface mutates configuration, so load-and-freeze is
//! sufficient -- the same crate and deserialization idiom is kept regardless.

use crate::core::errors::FerroError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppendFsync {
    Always,
    Everysec,
    No,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub appendonly: bool,
    pub appendfilename: String,
    pub appendfsync: AppendFsync,
    pub maxclients: u32,
    pub reap_interval_ms: u64,
    pub shard_count: usize,
    pub lock_table_size: usize,
    pub aof_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 6379,
            appendonly: false,
            appendfilename: "appendonly.aof".to_string(),
            appendfsync: AppendFsync::Everysec,
            maxclients: 10_000,
            reap_interval_ms: 5_000,
            shard_count: crate::core::storage::db::NUM_SHARDS,
            lock_table_size: crate::core::storage::db::LOCK_TABLE_SIZE,
            aof_queue_capacity: 65_536,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (if it exists) layered over the
    /// defaults above, then over `APP_`-prefixed environment variables
    /// (e.g. `APP_PORT=6380`), matching the teacher's `config` + `serde`
    /// stack.
    pub fn load(path: Option<&Path>) -> Result<Self, FerroError> {
        let defaults = Config::default();
        let mut builder = config::Config::builder()
            .set_default("bind", defaults.bind.clone())
            .map_err(|e| FerroError::Internal(e.to_string()))?
            .set_default("port", defaults.port as i64)
            .map_err(|e| FerroError::Internal(e.to_string()))?
            .set_default("appendonly", defaults.appendonly)
            .map_err(|e| FerroError::Internal(e.to_string()))?
            .set_default("appendfilename", defaults.appendfilename.clone())
            .map_err(|e| FerroError::Internal(e.to_string()))?
            .set_default("appendfsync", "everysec")
            .map_err(|e| FerroError::Internal(e.to_string()))?
            .set_default("maxclients", defaults.maxclients as i64)
            .map_err(|e| FerroError::Internal(e.to_string()))?
            .set_default("reap_interval_ms", defaults.reap_interval_ms as i64)
            .map_err(|e| FerroError::Internal(e.to_string()))?
            .set_default("shard_count", defaults.shard_count as i64)
            .map_err(|e| FerroError::Internal(e.to_string()))?
            .set_default("lock_table_size", defaults.lock_table_size as i64)
            .map_err(|e| FerroError::Internal(e.to_string()))?
            .set_default("aof_queue_capacity", defaults.aof_queue_capacity as i64)
            .map_err(|e| FerroError::Internal(e.to_string()))?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("APP")
                .separator("_")
                .try_parsing(true),
        );

        let cfg: Config = builder
            .build()
            .map_err(|e| FerroError::Internal(e.to_string()))?
            .try_deserialize()
            .map_err(|e| FerroError::Internal(e.to_string()))?;

        if cfg.shard_count != crate::core::storage::db::NUM_SHARDS {
            tracing::warn!(
                configured = cfg.shard_count,
                compiled = crate::core::storage::db::NUM_SHARDS,
                "shard_count is compiled into the keyspace; the configured value is recorded but not applied"
            );
        }
        if cfg.lock_table_size != crate::core::storage::db::LOCK_TABLE_SIZE {
            tracing::warn!(
                configured = cfg.lock_table_size,
                compiled = crate::core::storage::db::LOCK_TABLE_SIZE,
                "lock_table_size is compiled into the key lock table; the configured value is recorded but not applied"
            );
        }

        Ok(cfg)
    }
}
