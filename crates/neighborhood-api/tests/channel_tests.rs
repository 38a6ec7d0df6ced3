//! End-to-end tests for the sync channel.
//!
//! Each test binds the full server on `127.0.0.1:0` and talks to it with a
//! real `WebSocket` client, checking both the frames a client receives and
//! the registry state exposed through the snapshot API.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use neighborhood_api::serve;
use neighborhood_api::state::AppState;
use neighborhood_presence::{IdentityProvider, PresenceConfig, StaticIdentity};
use neighborhood_types::{ClientId, Profile, ServerMessage};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_TIMEOUT: Duration = Duration::from_secs(3);

/// Start the server on a random port.
async fn start_test_server(state: Arc<AppState>) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        serve(listener, state).await.unwrap();
    });
    (addr, handle)
}

async fn connect(addr: SocketAddr, client_id: &str, token: Option<&str>) -> Socket {
    let url = token.map_or_else(
        || format!("ws://{addr}/ws?clientId={client_id}"),
        |t| format!("ws://{addr}/ws?clientId={client_id}&token={t}"),
    );
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

/// Next application frame, skipping transport-level ping/pong.
async fn next_message(ws: &mut Socket) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(FRAME_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket ended")
            .unwrap();
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("Expected text frame, got {other:?}"),
        }
    }
}

/// Read until the server closes the socket; returns the close code.
async fn expect_close(ws: &mut Socket) -> u16 {
    loop {
        let frame = tokio::time::timeout(FRAME_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for close");
        match frame {
            Some(Ok(Message::Close(Some(frame)))) => return u16::from(frame.code),
            Some(Ok(Message::Close(None))) | None => panic!("Expected close frame with code"),
            Some(Ok(_)) => {}
            Some(Err(e)) => panic!("Expected close frame, got error {e}"),
        }
    }
}

async fn send_json(ws: &mut Socket, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Send an app-level ping and wait for its pong.
///
/// The server handles inbound frames in order, so once the pong arrives
/// every earlier frame has been applied.
async fn sync(ws: &mut Socket) {
    send_json(ws, json!({ "type": "ping" })).await;
    match next_message(ws).await {
        ServerMessage::Pong { .. } => {}
        other => panic!("Expected pong, got {other:?}"),
    }
}

/// Send an app-level ping and collect every frame that arrives before
/// its pong.
async fn frames_until_pong(ws: &mut Socket) -> Vec<ServerMessage> {
    send_json(ws, json!({ "type": "ping" })).await;
    let mut frames = Vec::new();
    loop {
        match next_message(ws).await {
            ServerMessage::Pong { .. } => return frames,
            other => frames.push(other),
        }
    }
}

async fn snapshot_ids(ws: &mut Socket) -> Vec<String> {
    match next_message(ws).await {
        ServerMessage::Snapshot { players, .. } => {
            players.into_iter().map(|p| p.client_id.0).collect()
        }
        other => panic!("Expected snapshot, got {other:?}"),
    }
}

async fn wait_until_absent(state: &AppState, id: &str) {
    let id = ClientId::from(id);
    for _ in 0..100 {
        if state.registry.get(&id).await.is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("entry {id} was never removed");
}

async fn get_player(addr: SocketAddr, id: &str) -> (u16, Value) {
    let response = reqwest::get(format!("http://{addr}/players/{id}")).await.unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

fn update(id: &str, x: f64, y: f64, timestamp: u64) -> Value {
    json!({
        "type": "update",
        "clientId": id,
        "position": { "x": x, "y": y },
        "timestamp": timestamp,
    })
}

#[tokio::test]
async fn snapshot_includes_existing_players_and_self() {
    let state = Arc::new(AppState::default());
    state
        .registry
        .upsert(&ClientId::from("early"), &neighborhood_types::StatePatch::default())
        .await;
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut ws = connect(addr, "a1", None).await;
    let ids = snapshot_ids(&mut ws).await;

    assert_eq!(ids, vec!["early".to_owned(), "a1".to_owned()]);
    assert_eq!(state.open_channels(), 1);
}

#[tokio::test]
async fn update_then_stale_then_disconnect() {
    let state = Arc::new(AppState::default());
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut ws = connect(addr, "a1", None).await;
    snapshot_ids(&mut ws).await;

    send_json(&mut ws, update("a1", 1.0, 1.0, 100)).await;
    sync(&mut ws).await;

    let (status, body) = get_player(addr, "a1").await;
    assert_eq!(status, 200);
    assert_eq!(body["player"]["position"]["x"], 1.0);
    assert_eq!(body["player"]["position"]["y"], 1.0);
    assert_eq!(body["player"]["lastUpdated"], 100);

    // Older timestamp is dropped.
    send_json(&mut ws, update("a1", 9.0, 9.0, 50)).await;
    sync(&mut ws).await;

    let (_, body) = get_player(addr, "a1").await;
    assert_eq!(body["player"]["position"]["x"], 1.0);
    assert_eq!(body["player"]["lastUpdated"], 100);

    ws.close(None).await.unwrap();
    wait_until_absent(&state, "a1").await;

    let (status, _) = get_player(addr, "a1").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn equal_timestamp_is_stale() {
    let state = Arc::new(AppState::default());
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut ws = connect(addr, "a1", None).await;
    snapshot_ids(&mut ws).await;

    send_json(&mut ws, update("a1", 2.0, 2.0, 7)).await;
    send_json(&mut ws, update("a1", 5.0, 5.0, 7)).await;
    sync(&mut ws).await;

    let entry = state.registry.get(&ClientId::from("a1")).await.unwrap();
    assert!((entry.position.x - 2.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn peers_receive_updates_without_echo() {
    let state = Arc::new(AppState::default());
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut a = connect(addr, "a", None).await;
    assert_eq!(snapshot_ids(&mut a).await, vec!["a".to_owned()]);

    let mut b = connect(addr, "b", None).await;
    assert_eq!(snapshot_ids(&mut b).await, vec!["a".to_owned(), "b".to_owned()]);

    // a learns that b joined.
    match next_message(&mut a).await {
        ServerMessage::Update { entry } => assert_eq!(entry.client_id.as_str(), "b"),
        other => panic!("Expected update for b, got {other:?}"),
    }

    send_json(&mut b, update("b", 4.0, 2.0, 1)).await;

    match next_message(&mut a).await {
        ServerMessage::Update { entry } => {
            assert_eq!(entry.client_id.as_str(), "b");
            assert!((entry.position.x - 4.0).abs() < f64::EPSILON);
        }
        other => panic!("Expected update for b, got {other:?}"),
    }

    // b's next frame is the pong, not an echo of its own update.
    sync(&mut b).await;

    a.close(None).await.unwrap();
    match next_message(&mut b).await {
        ServerMessage::Remove { entry } => assert_eq!(entry.client_id.as_str(), "a"),
        other => panic!("Expected remove for a, got {other:?}"),
    }

    // Exactly one removal per closed channel.
    tokio::time::sleep(Duration::from_millis(50)).await;
    sync(&mut b).await;
}

#[tokio::test]
async fn update_for_another_client_is_ignored() {
    let state = Arc::new(AppState::default());
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut a = connect(addr, "a", None).await;
    snapshot_ids(&mut a).await;
    let mut b = connect(addr, "b", None).await;
    snapshot_ids(&mut b).await;
    match next_message(&mut a).await {
        ServerMessage::Update { entry } => assert_eq!(entry.client_id.as_str(), "b"),
        other => panic!("Expected update for b, got {other:?}"),
    }

    send_json(&mut a, update("b", 8.0, 8.0, 1)).await;
    sync(&mut a).await;

    let entry = state.registry.get(&ClientId::from("b")).await.unwrap();
    assert_eq!(entry.last_updated, 0);
    assert!(entry.position.x.abs() < f64::EPSILON);
}

#[tokio::test]
async fn malformed_frame_keeps_channel_open() {
    let state = Arc::new(AppState::default());
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut ws = connect(addr, "a1", None).await;
    snapshot_ids(&mut ws).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    send_json(&mut ws, json!({ "type": "teleport" })).await;
    sync(&mut ws).await;

    assert!(state.registry.get(&ClientId::from("a1")).await.is_some());
}

#[tokio::test]
async fn invalid_profile_is_dropped() {
    let state = Arc::new(AppState::default());
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut ws = connect(addr, "a1", None).await;
    snapshot_ids(&mut ws).await;

    send_json(
        &mut ws,
        json!({
            "type": "update",
            "clientId": "a1",
            "profile": { "displayName": "" },
            "timestamp": 5,
        }),
    )
    .await;
    sync(&mut ws).await;

    let entry = state.registry.get(&ClientId::from("a1")).await.unwrap();
    assert_eq!(entry.display_name, "Anonymous");
    assert_eq!(entry.last_updated, 0);
}

#[tokio::test]
async fn silent_client_is_closed_after_liveness_timeout() {
    let presence = PresenceConfig {
        liveness_timeout_secs: 1,
        ..PresenceConfig::default()
    };
    let state = Arc::new(AppState::new(presence, IdentityProvider::Disabled));
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut ws = connect(addr, "quiet", None).await;
    snapshot_ids(&mut ws).await;

    assert_eq!(expect_close(&mut ws).await, 1001);
    wait_until_absent(&state, "quiet").await;
}

#[tokio::test]
async fn second_connection_takes_over_client_id() {
    let state = Arc::new(AppState::default());
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut watcher = connect(addr, "watcher", None).await;
    snapshot_ids(&mut watcher).await;

    let mut first = connect(addr, "dup", None).await;
    snapshot_ids(&mut first).await;

    let mut second = connect(addr, "dup", None).await;
    assert_eq!(
        snapshot_ids(&mut second).await,
        vec!["watcher".to_owned(), "dup".to_owned()]
    );

    assert_eq!(expect_close(&mut first).await, 4000);

    // The old channel's teardown must not remove the new entry.
    send_json(&mut second, update("dup", 3.0, 3.0, 1)).await;
    sync(&mut second).await;

    assert_eq!(state.registry.count().await, 2);
    let entry = state.registry.get(&ClientId::from("dup")).await.unwrap();
    assert!((entry.position.x - 3.0).abs() < f64::EPSILON);

    // Observers see each open and the new owner's move, never a removal.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let frames = frames_until_pong(&mut watcher).await;
    assert_eq!(frames.len(), 3, "unexpected frames: {frames:?}");
    for frame in frames {
        match frame {
            ServerMessage::Update { entry } => assert_eq!(entry.client_id.as_str(), "dup"),
            other => panic!("Expected update for dup, got {other:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_connections_leave_one_owner() {
    let state = Arc::new(AppState::default());
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    for round in 0..30 {
        let id = format!("race-{round}");
        let (mut x, mut y) = tokio::join!(connect(addr, &id, None), connect(addr, &id, None));
        tokio::join!(snapshot_ids(&mut x), snapshot_ids(&mut y));

        // The loser closes itself; give a wrongly closing winner time to
        // follow.
        for _ in 0..100 {
            if state.open_channels() <= 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(state.open_channels(), 1, "round {round}");
        assert!(
            state.registry.get(&ClientId::from(id.as_str())).await.is_some(),
            "round {round}: entry lost"
        );

        let _ = x.close(None).await;
        let _ = y.close(None).await;
        wait_until_absent(&state, &id).await;
        for _ in 0..100 {
            if state.open_channels() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[tokio::test]
async fn lagging_channel_is_resynced_with_snapshot() {
    let presence = PresenceConfig {
        broadcast_capacity: 16,
        ..PresenceConfig::default()
    };
    let state = Arc::new(AppState::new(presence, IdentityProvider::Disabled));
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut ws = connect(addr, "slow", None).await;
    snapshot_ids(&mut ws).await;

    // Burst well past the event buffer before the channel task runs again.
    for n in 0..64 {
        state
            .registry
            .upsert(
                &ClientId::from(format!("bulk-{n}")),
                &neighborhood_types::StatePatch::default(),
            )
            .await;
    }

    let mut resynced = None;
    for _ in 0..80 {
        match next_message(&mut ws).await {
            ServerMessage::Snapshot { players, .. } => {
                resynced = Some(players);
                break;
            }
            ServerMessage::Update { .. } => {}
            other => panic!("Expected snapshot or update, got {other:?}"),
        }
    }
    let players = resynced.expect("no resync snapshot after lag");
    assert_eq!(players.len(), 65);
    assert!(players.iter().any(|p| p.client_id.as_str() == "slow"));

    // The channel stays usable after the resync.
    send_json(&mut ws, update("slow", 2.0, 2.0, 1)).await;
    let frames = frames_until_pong(&mut ws).await;
    assert!(
        frames.iter().all(|f| matches!(f, ServerMessage::Update { .. })),
        "unexpected frames: {frames:?}"
    );
    let entry = state.registry.get(&ClientId::from("slow")).await.unwrap();
    assert_eq!(entry.last_updated, 1);
}

#[tokio::test]
async fn malformed_client_id_is_rejected() {
    let state = Arc::new(AppState::default());
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let long_id = "x".repeat(neighborhood_types::MAX_CLIENT_ID_LEN + 1);
    let url = format!("ws://{addr}/ws?clientId={long_id}");
    match tokio_tungstenite::connect_async(url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 400);
        }
        Err(e) => panic!("Expected HTTP 400, got error {e}"),
        Ok(_) => panic!("Expected HTTP 400, got an open channel"),
    }
    assert_eq!(state.registry.count().await, 0);
}

#[tokio::test]
async fn missing_client_id_is_generated() {
    let state = Arc::new(AppState::default());
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    let ids = snapshot_ids(&mut ws).await;

    assert_eq!(ids.len(), 1);
    assert!(neighborhood_types::ClientId::is_well_formed(&ids[0]));
}

#[tokio::test]
async fn enrichment_updates_display_name() {
    let identity = StaticIdentity::new().with_profile(
        "tok-carol",
        Profile {
            display_name: String::from("Carol"),
            profile_picture_url: Some(String::from("https://img.example/carol.png")),
        },
    );
    let state = Arc::new(AppState::new(
        PresenceConfig::default(),
        IdentityProvider::Static(identity),
    ));
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut ws = connect(addr, "c1", Some("tok-carol")).await;

    // Enrichment may land before or after the snapshot is read.
    let mut enriched = false;
    for _ in 0..3 {
        let name = match next_message(&mut ws).await {
            ServerMessage::Snapshot { players, .. } => players
                .into_iter()
                .find(|p| p.client_id.as_str() == "c1")
                .map(|p| p.display_name),
            ServerMessage::Update { entry } => Some(entry.display_name),
            other => panic!("Expected snapshot or update, got {other:?}"),
        };
        if name.as_deref() == Some("Carol") {
            enriched = true;
            break;
        }
    }
    assert!(enriched);

    let (_, body) = get_player(addr, "c1").await;
    assert_eq!(body["player"]["displayName"], "Carol");
    assert_eq!(
        body["player"]["profilePictureUrl"],
        "https://img.example/carol.png"
    );
}

#[tokio::test]
async fn unknown_token_keeps_placeholder() {
    let state = Arc::new(AppState::new(
        PresenceConfig::default(),
        IdentityProvider::Static(StaticIdentity::new()),
    ));
    let (addr, _server) = start_test_server(Arc::clone(&state)).await;

    let mut ws = connect(addr, "c2", Some("bogus")).await;
    snapshot_ids(&mut ws).await;
    sync(&mut ws).await;

    let (status, body) = get_player(addr, "c2").await;
    assert_eq!(status, 200);
    assert_eq!(body["player"]["displayName"], "Anonymous");
}

#[tokio::test]
async fn shutdown_closes_channels_and_clears_registry() {
    let state = Arc::new(AppState::default());
    let (addr, server) = start_test_server(Arc::clone(&state)).await;

    let mut ws = connect(addr, "s1", None).await;
    snapshot_ids(&mut ws).await;

    state.shutdown().await;

    assert_eq!(expect_close(&mut ws).await, 1001);
    assert_eq!(state.registry.count().await, 0);
    tokio::time::timeout(FRAME_TIMEOUT, server)
        .await
        .expect("server did not stop")
        .unwrap();
}
