//! Bingo Server
//!
//! Runs the session registry behind the WebSocket adapter.

use std::sync::Arc;
use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bingo_engine::{
    EngineConfig, SessionRegistry, VERSION,
    network::{GameServer, JsonLinesStore, MemoryResultStore, ResultStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = EngineConfig::from_env().context("loading configuration")?;

    info!("Bingo Server v{}", VERSION);
    info!(
        "Sessions: {} seats, start at {} players, {}s countdown, calls every {:?}-{:?}",
        config.session.capacity,
        config.session.min_players,
        config.session.countdown.as_secs(),
        config.session.call_interval_min,
        config.session.call_interval_max,
    );

    let store: Arc<dyn ResultStore> = match &config.server.results_path {
        Some(path) => {
            info!("Recording results to {}", path.display());
            Arc::new(JsonLinesStore::new(path.clone()))
        }
        None => {
            info!("Recording results in memory");
            Arc::new(MemoryResultStore::new())
        }
    };

    let registry = SessionRegistry::start(config.session.clone(), store);
    let server = Arc::new(GameServer::new(config.server.clone(), registry.clone()));

    let mut serving = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for ctrl-c")?;
            info!("Interrupted, shutting down");
            server.shutdown();
            serving.await.context("server task panicked")??;
        }
        result = &mut serving => {
            result.context("server task panicked")??;
        }
    }

    registry.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
