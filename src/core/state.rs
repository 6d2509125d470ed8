// src/core/state.rs

//! `ServerState`: the handles every connection task shares -- the database,
//! the pub/sub hub, the AOF pipeline, configuration, and metrics.

use crate::config::Config;
use crate::core::metrics::Metrics;
use crate::core::persistence::AofHandle;
use crate::core::pubsub::PubSubHub;
use crate::core::storage::db::Db;
use std::sync::Arc;

pub struct ServerState {
    pub db: Arc<Db>,
    pub pubsub: Arc<PubSubHub>,
    pub aof: Arc<AofHandle>,
    pub config: Config,
    pub metrics: &'static Metrics,
}

impl ServerState {
    pub fn new(db: Arc<Db>, pubsub: Arc<PubSubHub>, aof: Arc<AofHandle>, config: Config) -> Self {
        Self {
            db,
            pubsub,
            aof,
            config,
            metrics: &crate::core::metrics::METRICS,
        }
    }
}
