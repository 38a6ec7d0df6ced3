//! Snapshot API endpoint handlers.
//!
//! All handlers read the live [`Registry`](neighborhood_presence::Registry)
//! through the shared [`AppState`]. Nothing here caches or mutates presence
//! state; a snapshot read never goes through the channel fan-out path.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/health` | Liveness probe with player and channel counts |
//! | `GET` | `/state` | All players plus server timestamp |
//! | `GET` | `/players/count` | Player count plus server timestamp |
//! | `GET` | `/players/:id` | Single player |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse};
use chrono::Utc;
use neighborhood_types::{ClientId, CountResponse, PlayerResponse, StateResponse};

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing the active player count and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let players = state.registry.count().await;
    let channels = state.open_channels();
    let revision = state.session_config.revision();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Neighborhood Presence</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
            min-width: 120px;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
    </style>
</head>
<body>
    <h1>Neighborhood Presence</h1>

    <div>
        <div class="metric">
            <div class="label">Active now</div>
            <div class="value">{players}</div>
        </div>
        <div class="metric">
            <div class="label">Channels</div>
            <div class="value">{channels}</div>
        </div>
        <div class="metric">
            <div class="label">Config revision</div>
            <div class="value">{revision}</div>
        </div>
    </div>

    <h2>API Endpoints</h2>
    <ul>
        <li>GET <a href="/state">/state</a> -- All connected players</li>
        <li>GET <a href="/players/count">/players/count</a> -- Active player count</li>
        <li>GET /players/:id -- Single player</li>
        <li>GET <a href="/config">/config</a> -- Session config</li>
        <li>POST /config -- Update session config</li>
        <li>GET <code>ws://host:port/ws?clientId=ID&amp;token=TOKEN</code> -- Sync channel</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Report that the server is up, with cheap counters.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let players = state.registry.count().await;
    Json(serde_json::json!({
        "status": "ok",
        "players": players,
        "channels": state.open_channels(),
        "timestamp": Utc::now().timestamp_millis(),
    }))
}

// ---------------------------------------------------------------------------
// GET /state -- full snapshot
// ---------------------------------------------------------------------------

/// Return every connected player plus a server timestamp.
///
/// Used for initial page load before a channel is established and as a
/// fallback when channel setup fails.
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    let (players, timestamp) = state.registry.snapshot().await;
    Json(StateResponse { players, timestamp })
}

// ---------------------------------------------------------------------------
// GET /players/count
// ---------------------------------------------------------------------------

/// Return only the number of connected players, for frequent polling.
pub async fn player_count(State(state): State<Arc<AppState>>) -> Json<CountResponse> {
    let count = state.registry.count().await;
    Json(CountResponse {
        count,
        timestamp: Utc::now().timestamp_millis(),
    })
}

// ---------------------------------------------------------------------------
// GET /players/:id
// ---------------------------------------------------------------------------

/// Return a single player, or 404 if the id is not connected.
pub async fn get_player(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PlayerResponse>, ApiError> {
    let client_id = ClientId::from(id);
    let player = state
        .registry
        .get(&client_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("player {client_id}")))?;

    Ok(Json(PlayerResponse { player }))
}
