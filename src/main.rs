// src/main.rs

use anyhow::{Context, Result};
use ferrokv::config::Config;
use ferrokv::core::metrics::METRICS;
use ferrokv::core::persistence::AofHandle;
use ferrokv::core::pubsub::PubSubHub;
use ferrokv::core::state::ServerState;
use ferrokv::core::storage::db::Db;
use ferrokv::core::storage::ttl::Reaper;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("loading configuration")?;

    let db = Arc::new(Db::new());
    let pubsub = Arc::new(PubSubHub::new());
    let aof_path = PathBuf::from(&config.appendfilename);
    let aof = AofHandle::start(
        config.appendonly,
        aof_path.clone(),
        config.appendfsync,
        config.aof_queue_capacity,
    )
    .context("starting the AOF writer")?;

    let state = Arc::new(ServerState::new(db.clone(), pubsub, aof, config.clone()));

    // Replay must complete before the writer is activated: otherwise every
    // replayed mutation would be re-enqueued onto the very file it was just
    // read from (see `AofHandle::activate`).
    if config.appendonly {
        let applied = ferrokv::core::persistence::replay(&state, &aof_path)
            .await
            .context("replaying the append-only file")?;
        info!(applied, "AOF replay finished");
    }
    state.aof.activate(&METRICS);

    let (shutdown_tx, _) = broadcast::channel(1);

    let reaper = Reaper::new(db, std::time::Duration::from_millis(config.reap_interval_ms));
    tokio::spawn(reaper.run(shutdown_tx.subscribe()));

    let server_state = state.clone();
    let server_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move { ferrokv::server::run(server_state, server_shutdown).await });

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(());

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "server loop exited with an error"),
        Err(e) => tracing::error!(error = %e, "server task panicked"),
    }

    Ok(())
}
