//! WebSocket upgrade handler and per-connection event loop.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::AppState;

use super::events::{
    codes, ClientEventPayload, ClientMessage, EventName, ServerMessage, SubscribePayload,
    UnsubscribePayload,
};
use super::session::{Outbound, Session};

pub fn router() -> Router<AppState> {
    Router::new().route("/app/{app_key}", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(app_key): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    if state.closing.load(Ordering::Relaxed) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| handle_connection(socket, state, app_key))
        .into_response()
}

async fn handle_connection(socket: WebSocket, state: AppState, app_key: String) {
    let (mut ws_tx, ws_rx) = socket.split();

    // Resolve the app before any session state exists. Failure here reports
    // over the raw sink and drops the transport.
    let app = match state.apps.find_by_key(&app_key).await {
        Ok(Some(app)) => Arc::new(app),
        Ok(None) => {
            tracing::debug!(app_key, "connection to unknown app rejected");
            let _ = send_message(
                &mut ws_tx,
                &ServerMessage::error(
                    "The app trying to reach does not exist.",
                    codes::APP_NOT_FOUND,
                ),
            )
            .await;
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
        Err(err) => {
            tracing::error!(app_key, %err, "app lookup failed at connect");
            let _ = send_message(
                &mut ws_tx,
                &ServerMessage::error("There is an internal problem.", codes::APP_NOT_FOUND),
            )
            .await;
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        }
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let session = Arc::new(Session::new(app.clone(), tx));
    let live = state.sessions.register(session.clone());
    state.stats.mark_new_connection(&app);

    tracing::info!(
        session_id = %session.id,
        app_id = %app.id,
        live_in_namespace = live,
        "session connected"
    );

    // Connection ceiling counts this session. Over quota, the error and close
    // are queued and drain through the normal loop below so the client sees
    // why it was dropped.
    if app.max_connections >= 0 && live as i64 > app.max_connections {
        session.send(ServerMessage::error(
            "The app has reached the connection quota.",
            codes::LIMIT_VIOLATION,
        ));
        session.close();
    } else {
        session.send(ServerMessage::connection_established(&session.id));
    }

    run_session(&state, &session, ws_tx, ws_rx, rx).await;

    // Teardown order matters: snapshot the rooms first, run each channel's
    // leave protocol (presence goodbyes included), then drop the count.
    state.stats.mark_disconnection(&app);
    for channel in session.rooms_snapshot() {
        state.channels.leave(&session, &channel, "disconnecting").await;
    }
    state.sessions.deregister(&session);

    tracing::info!(session_id = %session.id, app_id = %app.id, "session disconnected");
}

/// Main event loop: drain the session's outbound queue and handle incoming
/// frames until either side ends the connection.
async fn run_session(
    state: &AppState,
    session: &Arc<Session>,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut ws_rx: SplitStream<WebSocket>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    loop {
        tokio::select! {
            queued = outbound.recv() => {
                match queued {
                    Some(Outbound::Message(message)) => {
                        if send_message(&mut ws_tx, &message).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let message: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(err) => {
                                tracing::debug!(
                                    session_id = %session.id,
                                    %err,
                                    "unparseable frame dropped"
                                );
                                continue;
                            }
                        };
                        dispatch(state, session, message).await;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(session_id = %session.id, %err, "ws read error");
                        break;
                    }
                    _ => continue,
                }
            }
        }
    }
}

async fn dispatch(state: &AppState, session: &Arc<Session>, message: ClientMessage) {
    match message.event.as_str() {
        EventName::SUBSCRIBE => {
            let payload: SubscribePayload = match serde_json::from_value(message.data) {
                Ok(p) => p,
                Err(err) => {
                    tracing::debug!(session_id = %session.id, %err, "bad subscribe payload");
                    return;
                }
            };
            let _ = state.channels.subscribe(session, payload).await;
        }
        EventName::UNSUBSCRIBE => {
            let payload: UnsubscribePayload = match serde_json::from_value(message.data) {
                Ok(p) => p,
                Err(err) => {
                    tracing::debug!(session_id = %session.id, %err, "bad unsubscribe payload");
                    return;
                }
            };
            state
                .channels
                .leave(session, &payload.channel, "unsubscribed")
                .await;
        }
        // The handler is only reachable when the app allows client messages.
        EventName::CLIENT_EVENT => {
            if !session.app.enable_client_messages {
                return;
            }
            let payload: ClientEventPayload = match serde_json::from_value(message.data) {
                Ok(p) => p,
                Err(err) => {
                    tracing::debug!(session_id = %session.id, %err, "bad client event payload");
                    return;
                }
            };
            state.channels.on_client_event(session, payload).await;
        }
        other => {
            tracing::debug!(session_id = %session.id, event = other, "unknown event dropped");
        }
    }
}

async fn send_message(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(%err, "failed to serialize outbound message");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await
}
