//! Presence server binary for Neighborhood.
//!
//! Loads configuration, builds the identity provider and shared state,
//! serves the sync channel and snapshot API, and tears everything down on
//! Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `neighborhood-config.yaml` (or the path
//!    given as the first argument)
//! 3. Build the identity provider
//! 4. Create the shared application state
//! 5. Bind and serve on a background task
//! 6. Wait for Ctrl-C, then shut down gracefully

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use neighborhood_api::AppState;
use neighborhood_api::startup::spawn_server;
use neighborhood_presence::{IdentityProvider, NeighborhoodConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::ServerBinError;

const DEFAULT_CONFIG_PATH: &str = "neighborhood-config.yaml";

/// Application entry point for the presence server.
///
/// # Errors
///
/// Returns an error if configuration, identity setup or binding fails.
#[tokio::main]
async fn main() -> Result<(), ServerBinError> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("neighborhood-server starting");

    // 2. Load configuration.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = load_config(&config_path)?;
    info!(
        host = config.server.host,
        port = config.server.port,
        liveness_timeout_secs = config.presence.liveness_timeout_secs,
        broadcast_capacity = config.presence.broadcast_capacity,
        "Configuration loaded"
    );

    // 3. Identity provider.
    let identity = IdentityProvider::from_config(&config.identity)?;
    info!(provider = identity.name(), "Identity provider ready");

    // 4. Shared state.
    let state = Arc::new(AppState::new(config.presence.clone(), identity));

    // 5. Serve.
    let (handle, addr) = spawn_server(&config.server, Arc::clone(&state)).await?;
    info!(%addr, "Presence server started");

    // 6. Wait for Ctrl-C, then tear down.
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| ServerBinError::Runtime {
            message: format!("failed to listen for Ctrl-C: {e}"),
        })?;
    info!("Shutdown signal received");

    state.shutdown().await;
    handle.await.map_err(|e| ServerBinError::Runtime {
        message: format!("server task failed: {e}"),
    })?;

    info!("neighborhood-server stopped");
    Ok(())
}

/// Load configuration from `path`.
///
/// Falls back to defaults (still honouring environment overrides) if the
/// file does not exist.
fn load_config(path: &Path) -> Result<NeighborhoodConfig, ServerBinError> {
    if path.exists() {
        Ok(NeighborhoodConfig::from_file(path)?)
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
        Ok(NeighborhoodConfig::parse("")?)
    }
}
