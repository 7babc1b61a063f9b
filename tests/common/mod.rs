use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::Router;

use riptide::apps::App;
use riptide::auth::{request, token};
use riptide::config::Config;
use riptide::AppState;

/// Apps available in every test state: one unrestricted, one with tight
/// quotas, one with client messages disabled.
pub const APPS_JSON: &str = r#"[
    {
        "id": "test-app",
        "key": "test-key",
        "secret": "test-secret",
        "enableStats": true
    },
    {
        "id": "limited-app",
        "key": "limited-key",
        "secret": "limited-secret",
        "maxConnections": 2,
        "maxReadReqPerMin": 2,
        "maxBackendEventsPerMin": 2,
        "maxClientEventsPerMin": 1
    },
    {
        "id": "quiet-app",
        "key": "quiet-key",
        "secret": "quiet-secret",
        "enableClientMessages": false
    }
]"#;

pub fn test_state() -> AppState {
    let mut config = Config::default();
    config.apps_json = Some(APPS_JSON.to_string());
    AppState::new(config)
}

pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = riptide::routes::router().with_state(state.clone());
    (app, state)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background for the life of the test.
pub async fn start_server() -> (SocketAddr, AppState) {
    let (app, state) = test_app();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Look up one of the fixture apps so tests can mint auth material.
pub async fn app_by_id(state: &AppState, id: &str) -> App {
    state
        .apps
        .find_by_id(id)
        .await
        .expect("registry")
        .expect("fixture app exists")
}

/// Build a signed query string for a `/apps/{appId}/...` request.
pub fn signed_query(
    app: &App,
    method: &str,
    path: &str,
    extra: &[(&str, &str)],
    body: Option<&str>,
) -> String {
    let mut params: BTreeMap<String, String> = BTreeMap::new();
    params.insert("auth_key".to_string(), app.key.clone());
    params.insert(
        "auth_timestamp".to_string(),
        chrono::Utc::now().timestamp().to_string(),
    );
    params.insert("auth_version".to_string(), "1.0".to_string());
    for (k, v) in extra {
        params.insert((*k).to_string(), (*v).to_string());
    }

    let signature = request::expected_signature(app, method, path, &params, body);
    params.insert("auth_signature".to_string(), signature);

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Auth token for subscribing to a private channel.
pub fn private_auth(app: &App, socket_id: &str, channel: &str) -> String {
    token::socket_auth_token(app, &token::private_canonical(socket_id, channel))
}

/// Auth token for subscribing to a presence channel with the given raw
/// member JSON.
pub fn presence_auth(app: &App, socket_id: &str, channel: &str, channel_data: &str) -> String {
    token::socket_auth_token(
        app,
        &token::presence_canonical(socket_id, channel, channel_data),
    )
}
