//! Axum router construction for the presence server.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for the browser client.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::operator;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the presence server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /health` -- liveness probe
/// - `GET /ws` -- `WebSocket` sync channel
/// - `GET /state` -- all players
/// - `GET /players/count` -- player count
/// - `GET /players/:id` -- single player
/// - `GET /config`, `POST /config` -- session config side channel
///
/// CORS allows any origin; the front end is served from a different host.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        // Sync channel
        .route("/ws", get(ws::ws_channel))
        // Snapshot API
        .route("/state", get(handlers::get_state))
        .route("/players/count", get(handlers::player_count))
        .route("/players/{id}", get(handlers::get_player))
        // Session config
        .route(
            "/config",
            get(operator::get_config).post(operator::update_config),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
