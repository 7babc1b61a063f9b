mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Connect to the gateway for an app key. Returns the stream before any
/// message has been read.
async fn connect(addr: SocketAddr, app_key: &str) -> WsStream {
    let url = format!("ws://{addr}/app/{app_key}");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

/// Read the next text frame as JSON, failing the test after 5 seconds.
async fn recv_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).expect("parse message")
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert nothing arrives for a short grace period.
async fn assert_silent(ws: &mut WsStream) {
    let result = time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "expected silence, got {result:?}");
}

async fn send_json(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Connect and consume the greeting, returning the stream and socket id.
async fn connect_established(addr: SocketAddr, app_key: &str) -> (WsStream, String) {
    let mut ws = connect(addr, app_key).await;
    let greeting = recv_json(&mut ws).await;
    assert_eq!(greeting["event"], "connection:established");
    let socket_id = greeting["data"]["socket_id"]
        .as_str()
        .expect("socket_id present")
        .to_string();
    (ws, socket_id)
}

async fn subscribe(ws: &mut WsStream, channel: &str, auth: Option<&str>, channel_data: Option<&str>) {
    let mut data = serde_json::json!({ "channel": channel });
    if let Some(auth) = auth {
        data["auth"] = serde_json::json!(auth);
    }
    if let Some(channel_data) = channel_data {
        data["channel_data"] = serde_json::json!(channel_data);
    }
    send_json(ws, serde_json::json!({ "event": "subscribe", "data": data })).await;
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_app_key_gets_protocol_error_and_close() {
    let (addr, _state) = common::start_server().await;
    let mut ws = connect(addr, "no-such-key").await;

    let error = recv_json(&mut ws).await;
    assert_eq!(error["event"], "socket:error");
    assert_eq!(error["data"]["code"], 4001);

    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for close")
        .expect("stream ended")
        .expect("ws read error");
    assert!(matches!(msg, tungstenite::Message::Close(_)));
}

#[tokio::test]
async fn admitted_connection_receives_its_socket_id() {
    let (addr, _state) = common::start_server().await;
    let (_ws, socket_id) = connect_established(addr, "test-key").await;

    let parts: Vec<&str> = socket_id.split('.').collect();
    assert_eq!(parts.len(), 2);
    assert!(parts[0].parse::<u64>().is_ok());
}

#[tokio::test]
async fn connection_quota_closes_the_overflow_session() {
    let (addr, _state) = common::start_server().await;

    // limited-key allows 2 concurrent connections.
    let (_ws1, _) = connect_established(addr, "limited-key").await;
    let (_ws2, _) = connect_established(addr, "limited-key").await;

    let mut ws3 = connect(addr, "limited-key").await;
    let error = recv_json(&mut ws3).await;
    assert_eq!(error["event"], "socket:error");
    assert_eq!(error["data"]["code"], 4100);

    // Dropping an admitted session frees a slot.
    drop(_ws1);
    time::sleep(Duration::from_millis(200)).await;
    let (_ws4, _) = connect_established(addr, "limited-key").await;
}

// ---------------------------------------------------------------------------
// Public and private channels
// ---------------------------------------------------------------------------

#[tokio::test]
async fn public_channel_join_needs_no_auth() {
    let (addr, _state) = common::start_server().await;
    let (mut ws, _) = connect_established(addr, "test-key").await;

    subscribe(&mut ws, "news", None, None).await;
    let joined = recv_json(&mut ws).await;
    assert_eq!(joined["event"], "channel:joined");
    assert_eq!(joined["data"], "news");
}

#[tokio::test]
async fn oversized_channel_name_is_a_limit_violation() {
    let (addr, _state) = common::start_server().await;
    let (mut ws, _) = connect_established(addr, "test-key").await;

    let name = "c".repeat(101);
    subscribe(&mut ws, &name, None, None).await;
    let error = recv_json(&mut ws).await;
    assert_eq!(error["event"], "socket:error");
    assert_eq!(error["data"]["code"], 4100);
}

#[tokio::test]
async fn private_channel_rejects_a_bad_token_silently() {
    let (addr, _state) = common::start_server().await;
    let (mut ws, _) = connect_established(addr, "test-key").await;

    subscribe(&mut ws, "private-room", Some("test-key:deadbeef"), None).await;
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn private_channel_accepts_a_signed_token() {
    let (addr, state) = common::start_server().await;
    let app = common::app_by_id(&state, "test-app").await;
    let (mut ws, socket_id) = connect_established(addr, "test-key").await;

    let auth = common::private_auth(&app, &socket_id, "private-room");
    subscribe(&mut ws, "private-room", Some(&auth), None).await;

    let joined = recv_json(&mut ws).await;
    assert_eq!(joined["event"], "channel:joined");
    assert_eq!(joined["data"], "private-room");
}

// ---------------------------------------------------------------------------
// Presence channels
// ---------------------------------------------------------------------------

async fn join_presence(
    addr: SocketAddr,
    state: &riptide::AppState,
    channel: &str,
    member_json: &str,
) -> (WsStream, String) {
    let app = common::app_by_id(state, "test-app").await;
    let (mut ws, socket_id) = connect_established(addr, "test-key").await;
    let auth = common::presence_auth(&app, &socket_id, channel, member_json);
    subscribe(&mut ws, channel, Some(&auth), Some(member_json)).await;
    (ws, socket_id)
}

#[tokio::test]
async fn presence_join_sends_the_full_roster_to_the_joiner() {
    let (addr, state) = common::start_server().await;
    let member = r#"{"user_id":"u1","user_data":{"name":"Ada"}}"#;

    let (mut ws, socket_id) = join_presence(addr, &state, "presence-room", member).await;

    let subscribed = recv_json(&mut ws).await;
    assert_eq!(subscribed["event"], "presence:subscribed");
    assert_eq!(subscribed["channel"], "presence-room");
    let roster = subscribed["data"].as_array().unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0]["user_id"], "u1");
    assert_eq!(roster[0]["socket_id"], socket_id);

    let joined = recv_json(&mut ws).await;
    assert_eq!(joined["event"], "channel:joined");
}

#[tokio::test]
async fn presence_join_notifies_existing_members() {
    let (addr, state) = common::start_server().await;

    let (mut ws1, _) = join_presence(
        addr,
        &state,
        "presence-room",
        r#"{"user_id":"u1","user_data":{}}"#,
    )
    .await;
    recv_json(&mut ws1).await; // presence:subscribed
    recv_json(&mut ws1).await; // channel:joined

    let (mut ws2, _) = join_presence(
        addr,
        &state,
        "presence-room",
        r#"{"user_id":"u2","user_data":{}}"#,
    )
    .await;
    let subscribed = recv_json(&mut ws2).await;
    assert_eq!(subscribed["data"].as_array().unwrap().len(), 2);

    let joining = recv_json(&mut ws1).await;
    assert_eq!(joining["event"], "presence:joining");
    assert_eq!(joining["data"]["user_id"], "u2");
}

#[tokio::test]
async fn duplicate_user_id_is_refused_with_an_info_notice() {
    let (addr, state) = common::start_server().await;
    let member = r#"{"user_id":"u1","user_data":{}}"#;

    let (mut ws1, _) = join_presence(addr, &state, "presence-room", member).await;
    recv_json(&mut ws1).await;
    recv_json(&mut ws1).await;

    let (mut ws2, _) = join_presence(addr, &state, "presence-room", member).await;
    let notice = recv_json(&mut ws2).await;
    assert_eq!(notice["event"], "socket:info");

    // The second session stays connected and the first is untouched.
    assert_silent(&mut ws1).await;
    subscribe(&mut ws2, "news", None, None).await;
    let joined = recv_json(&mut ws2).await;
    assert_eq!(joined["event"], "channel:joined");
}

#[tokio::test]
async fn malformed_member_json_is_a_protocol_error() {
    let (addr, state) = common::start_server().await;
    let (mut ws, _) = join_presence(addr, &state, "presence-room", "not json").await;

    let error = recv_json(&mut ws).await;
    assert_eq!(error["event"], "socket:error");
    assert_eq!(error["data"]["code"], 4303);
}

#[tokio::test]
async fn departing_member_triggers_presence_leaving() {
    let (addr, state) = common::start_server().await;

    let (mut ws1, _) = join_presence(
        addr,
        &state,
        "presence-room",
        r#"{"user_id":"u1","user_data":{}}"#,
    )
    .await;
    recv_json(&mut ws1).await;
    recv_json(&mut ws1).await;

    let (mut ws2, _) = join_presence(
        addr,
        &state,
        "presence-room",
        r#"{"user_id":"u2","user_data":{}}"#,
    )
    .await;
    recv_json(&mut ws2).await;
    recv_json(&mut ws2).await;
    recv_json(&mut ws1).await; // presence:joining for u2

    drop(ws2);

    let leaving = recv_json(&mut ws1).await;
    assert_eq!(leaving["event"], "presence:leaving");
    assert_eq!(leaving["data"]["user_id"], "u2");
}

#[tokio::test]
async fn unsubscribe_without_a_prior_join_stays_silent() {
    let (addr, state) = common::start_server().await;

    let (mut ws1, _) = join_presence(
        addr,
        &state,
        "presence-room",
        r#"{"user_id":"u1","user_data":{}}"#,
    )
    .await;
    recv_json(&mut ws1).await; // presence:subscribed
    recv_json(&mut ws1).await; // channel:joined

    // A second session leaves a channel it never joined.
    let (mut ws2, _) = connect_established(addr, "test-key").await;
    send_json(
        &mut ws2,
        serde_json::json!({
            "event": "unsubscribe",
            "data": { "channel": "presence-room" }
        }),
    )
    .await;

    // No presence:leaving reaches the member, and the leaver is unaffected.
    assert_silent(&mut ws1).await;
    assert_silent(&mut ws2).await;
    subscribe(&mut ws2, "news", None, None).await;
    let joined = recv_json(&mut ws2).await;
    assert_eq!(joined["event"], "channel:joined");
}

// ---------------------------------------------------------------------------
// Client events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_event_reaches_everyone_but_the_sender() {
    let (addr, state) = common::start_server().await;
    let app = common::app_by_id(&state, "test-app").await;

    let (mut ws1, id1) = connect_established(addr, "test-key").await;
    let auth = common::private_auth(&app, &id1, "private-room");
    subscribe(&mut ws1, "private-room", Some(&auth), None).await;
    recv_json(&mut ws1).await;

    let (mut ws2, id2) = connect_established(addr, "test-key").await;
    let auth = common::private_auth(&app, &id2, "private-room");
    subscribe(&mut ws2, "private-room", Some(&auth), None).await;
    recv_json(&mut ws2).await;

    send_json(
        &mut ws1,
        serde_json::json!({
            "event": "client event",
            "data": {
                "event": "client-typing",
                "channel": "private-room",
                "data": { "typing": true }
            }
        }),
    )
    .await;

    let received = recv_json(&mut ws2).await;
    assert_eq!(received["event"], "client-typing");
    assert_eq!(received["channel"], "private-room");
    assert_eq!(received["data"]["typing"], true);

    assert_silent(&mut ws1).await;
}

#[tokio::test]
async fn client_event_from_outside_the_channel_is_dropped() {
    let (addr, state) = common::start_server().await;
    let app = common::app_by_id(&state, "test-app").await;

    let (mut ws1, id1) = connect_established(addr, "test-key").await;
    let auth = common::private_auth(&app, &id1, "private-room");
    subscribe(&mut ws1, "private-room", Some(&auth), None).await;
    recv_json(&mut ws1).await;

    // Never subscribed.
    let (mut ws2, _) = connect_established(addr, "test-key").await;
    send_json(
        &mut ws2,
        serde_json::json!({
            "event": "client event",
            "data": {
                "event": "client-spoof",
                "channel": "private-room",
                "data": {}
            }
        }),
    )
    .await;

    assert_silent(&mut ws1).await;
    assert_silent(&mut ws2).await;
}

#[tokio::test]
async fn client_event_quota_reports_to_the_sender_only() {
    let (addr, state) = common::start_server().await;
    let app = common::app_by_id(&state, "limited-app").await;

    // maxClientEventsPerMin is 1 for this fixture.
    let (mut ws1, id1) = connect_established(addr, "limited-key").await;
    let auth = common::private_auth(&app, &id1, "private-room");
    subscribe(&mut ws1, "private-room", Some(&auth), None).await;
    recv_json(&mut ws1).await;

    let (mut ws2, id2) = connect_established(addr, "limited-key").await;
    let auth = common::private_auth(&app, &id2, "private-room");
    subscribe(&mut ws2, "private-room", Some(&auth), None).await;
    recv_json(&mut ws2).await;

    let event = serde_json::json!({
        "event": "client event",
        "data": {
            "event": "client-ping",
            "channel": "private-room",
            "data": {}
        }
    });

    send_json(&mut ws1, event.clone()).await;
    let received = recv_json(&mut ws2).await;
    assert_eq!(received["event"], "client-ping");

    send_json(&mut ws1, event).await;
    let error = recv_json(&mut ws1).await;
    assert_eq!(error["event"], "socket:error");
    assert_eq!(error["data"]["code"], 4100);
    assert_silent(&mut ws2).await;
}

#[tokio::test]
async fn client_events_are_ignored_when_the_app_disables_them() {
    let (addr, state) = common::start_server().await;
    let app = common::app_by_id(&state, "quiet-app").await;

    let (mut ws1, id1) = connect_established(addr, "quiet-key").await;
    let auth = common::private_auth(&app, &id1, "private-room");
    subscribe(&mut ws1, "private-room", Some(&auth), None).await;
    recv_json(&mut ws1).await;

    let (mut ws2, id2) = connect_established(addr, "quiet-key").await;
    let auth = common::private_auth(&app, &id2, "private-room");
    subscribe(&mut ws2, "private-room", Some(&auth), None).await;
    recv_json(&mut ws2).await;

    send_json(
        &mut ws1,
        serde_json::json!({
            "event": "client event",
            "data": {
                "event": "client-muted",
                "channel": "private-room",
                "data": {}
            }
        }),
    )
    .await;

    assert_silent(&mut ws2).await;
}

// ---------------------------------------------------------------------------
// HTTP publish to live sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn published_event_reaches_subscribers_except_the_excluded_socket() {
    let (addr, state) = common::start_server().await;
    let app = common::app_by_id(&state, "test-app").await;

    let (mut ws1, id1) = connect_established(addr, "test-key").await;
    subscribe(&mut ws1, "orders", None, None).await;
    recv_json(&mut ws1).await;

    let (mut ws2, _) = connect_established(addr, "test-key").await;
    subscribe(&mut ws2, "orders", None, None).await;
    recv_json(&mut ws2).await;

    let path = "/apps/test-app/events";
    let body = serde_json::json!({
        "name": "order-created",
        "data": "{\"order\": 42}",
        "channel": "orders",
        "socket_id": id1,
    })
    .to_string();
    let query = common::signed_query(&app, "POST", path, &[], Some(&body));

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}{path}?{query}"))
        .body(body)
        .send()
        .await
        .expect("publish request");
    assert!(resp.status().is_success());

    let received = recv_json(&mut ws2).await;
    assert_eq!(received["event"], "order-created");
    assert_eq!(received["channel"], "orders");
    assert_eq!(received["data"]["order"], 42);

    assert_silent(&mut ws1).await;
}

#[tokio::test]
async fn published_string_data_is_delivered_verbatim() {
    let (addr, state) = common::start_server().await;
    let app = common::app_by_id(&state, "test-app").await;

    let (mut ws, _) = connect_established(addr, "test-key").await;
    subscribe(&mut ws, "lobby", None, None).await;
    recv_json(&mut ws).await;

    let path = "/apps/test-app/events";
    let body = serde_json::json!({
        "name": "greeting",
        "data": "hello world",
        "channel": "lobby",
    })
    .to_string();
    let query = common::signed_query(&app, "POST", path, &[], Some(&body));

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}{path}?{query}"))
        .body(body)
        .send()
        .await
        .expect("publish request");
    assert!(resp.status().is_success());

    let received = recv_json(&mut ws).await;
    assert_eq!(received["event"], "greeting");
    assert_eq!(received["data"], "hello world");
}

#[tokio::test]
async fn subscription_count_reflects_live_sessions() {
    let (addr, state) = common::start_server().await;
    let app = common::app_by_id(&state, "test-app").await;

    let (mut ws, _) = connect_established(addr, "test-key").await;
    subscribe(&mut ws, "news", None, None).await;
    recv_json(&mut ws).await;

    let path = "/apps/test-app/channels/news";
    let query = common::signed_query(&app, "GET", path, &[], None);
    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .get(format!("http://{addr}{path}?{query}"))
        .send()
        .await
        .expect("info request")
        .json()
        .await
        .expect("parse info");

    assert_eq!(body["subscription_count"], 1);
    assert_eq!(body["occupied"], true);
}
