//! Integration tests for the snapshot API and config endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. This validates handler logic and routing
//! without needing a live network connection.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use neighborhood_api::router::build_router;
use neighborhood_api::state::AppState;
use neighborhood_types::{ClientId, Position, ProfilePatch, StatePatch};
use serde_json::Value;
use tower::ServiceExt;

async fn make_test_state() -> Arc<AppState> {
    let state = Arc::new(AppState::default());

    state
        .registry
        .upsert(
            &ClientId::from("alice"),
            &StatePatch {
                position: Some(Position::new(3.0, 4.0)),
                profile: Some(ProfilePatch {
                    display_name: Some(String::from("Alice")),
                    profile_picture_url: None,
                }),
            },
        )
        .await;
    state
        .registry
        .upsert(&ClientId::from("bob"), &StatePatch::position(Position::new(1.0, 1.0)))
        .await;

    state
}

async fn get_json(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let app = build_router(Arc::clone(state));
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(state: &Arc<AppState>, uri: &str, body: &str) -> (StatusCode, Value) {
    let app = build_router(Arc::clone(state));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_owned()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn index_returns_html() {
    let state = make_test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains("Neighborhood Presence"));
    assert!(html.contains("/players/count"));
}

#[tokio::test]
async fn health_reports_counts() {
    let state = make_test_state().await;
    let (status, json) = get_json(&state, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["players"], 2);
    assert_eq!(json["channels"], 0);
}

#[tokio::test]
async fn state_lists_players_in_insertion_order() {
    let state = make_test_state().await;
    let (status, json) = get_json(&state, "/state").await;

    assert_eq!(status, StatusCode::OK);
    let players = json["players"].as_array().unwrap();
    assert_eq!(players.len(), 2);
    assert_eq!(players[0]["clientId"], "alice");
    assert_eq!(players[0]["displayName"], "Alice");
    assert_eq!(players[0]["position"]["x"], 3.0);
    assert_eq!(players[1]["clientId"], "bob");
    assert_eq!(players[1]["displayName"], "Anonymous");
    assert!(json["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn count_matches_state_length() {
    let state = make_test_state().await;
    let (_, listed) = get_json(&state, "/state").await;
    let (status, counted) = get_json(&state, "/players/count").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        counted["count"].as_u64().unwrap(),
        listed["players"].as_array().unwrap().len() as u64
    );
}

#[tokio::test]
async fn empty_registry_reports_zero() {
    let state = Arc::new(AppState::default());
    let (_, listed) = get_json(&state, "/state").await;
    let (_, counted) = get_json(&state, "/players/count").await;

    assert!(listed["players"].as_array().unwrap().is_empty());
    assert_eq!(counted["count"], 0);
}

#[tokio::test]
async fn get_player_found() {
    let state = make_test_state().await;
    let (status, json) = get_json(&state, "/players/alice").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["player"]["clientId"], "alice");
    assert_eq!(json["player"]["position"]["y"], 4.0);
}

#[tokio::test]
async fn get_player_not_found() {
    let state = make_test_state().await;
    let (status, json) = get_json(&state, "/players/nobody").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn removed_player_is_not_found() {
    let state = make_test_state().await;
    state.registry.remove(&ClientId::from("bob")).await;

    let (status, _) = get_json(&state, "/players/bob").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, counted) = get_json(&state, "/players/count").await;
    assert_eq!(counted["count"], 1);
}

#[tokio::test]
async fn post_config_accepts_object() {
    let state = make_test_state().await;
    let (status, json) = post_json(&state, "/config", r#"{"mapName":"plaza","maxPlayers":50}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["revision"], 1);

    let (status, view) = get_json(&state, "/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["values"]["mapName"], "plaza");
    assert_eq!(view["values"]["maxPlayers"], 50);
}

#[tokio::test]
async fn post_config_null_deletes_key() {
    let state = make_test_state().await;
    post_json(&state, "/config", r#"{"a":1,"b":2}"#).await;
    post_json(&state, "/config", r#"{"a":null}"#).await;

    let (_, view) = get_json(&state, "/config").await;
    assert!(view["values"].get("a").is_none());
    assert_eq!(view["values"]["b"], 2);
    assert_eq!(view["revision"], 2);
}

#[tokio::test]
async fn post_config_rejects_non_object() {
    let state = make_test_state().await;
    let (status, json) = post_json(&state, "/config", "[1,2,3]").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], 400);
    assert_eq!(state.session_config.revision(), 0);
}

#[tokio::test]
async fn post_config_does_not_touch_registry() {
    let state = make_test_state().await;
    post_json(&state, "/config", r#"{"theme":"night"}"#).await;

    assert_eq!(state.registry.count().await, 2);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let state = make_test_state().await;
    let app = build_router(state);

    let response = app
        .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
