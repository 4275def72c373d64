//! Hexfield game server.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `hexfield-config.yaml` (or `$HEXFIELD_CONFIG`),
//!    falling back to defaults when absent, and apply environment overrides
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and run migrations
//! 4. Load the content catalog
//! 5. Serve the HTTP API until `Ctrl-C`
//! 6. Close the pool

mod error;
mod logging;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use hexfield_api::AppState;
use hexfield_db::{Game, PostgresConfig, PostgresPool};
use hexfield_engine::GameConfig;
use tracing::info;

use crate::error::ServerError;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "hexfield-config.yaml";

/// Environment variable naming an alternative configuration file.
const CONFIG_ENV: &str = "HEXFIELD_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("loading configuration")?;
    logging::init(&config.logging).context("initializing logging")?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        identity_header = %config.server.identity_header,
        "hexfield-server starting"
    );

    run(config).await.context("running server")?;
    Ok(())
}

async fn run(config: GameConfig) -> Result<(), ServerError> {
    let pool = PostgresPool::connect(&PostgresConfig::from(&config.database)).await?;
    pool.run_migrations().await?;

    let game = Game::load(pool.pool().clone(), config.clone()).await?;
    let catalog = game.catalog();
    info!(
        crops = catalog.crops.len(),
        recipes = catalog.recipes.len(),
        building_types = catalog.building_types.len(),
        species = catalog.species.len(),
        "Content loaded"
    );

    let state = Arc::new(AppState::new(game));
    hexfield_api::start_server(&config.server, state, shutdown_signal()).await?;

    pool.close().await;
    Ok(())
}

fn load_config() -> Result<GameConfig, ServerError> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        return Ok(GameConfig::from_file(Path::new(&explicit))?);
    }
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        Ok(GameConfig::from_file(path)?)
    } else {
        let mut config = GameConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
