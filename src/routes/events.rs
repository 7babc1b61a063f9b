//! Backend event publishing endpoint.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::channels::data_to_bytes;
use crate::error::ApiError;
use crate::gateway::events::ServerMessage;
use crate::limiter::ConsumeResult;
use crate::AppState;

use super::authorized_app;

pub fn router() -> Router<AppState> {
    Router::new().route("/apps/{app_id}/events", post(publish_event))
}

#[derive(Debug, Deserialize)]
struct PublishRequest {
    name: Option<String>,
    data: Option<Value>,
    channel: Option<String>,
    channels: Option<Vec<String>>,
    socket_id: Option<String>,
}

// ---------------------------------------------------------------------------
// POST /apps/:app_id/events
// ---------------------------------------------------------------------------

async fn publish_event(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let path = format!("/apps/{app_id}/events");
    let app = authorized_app(&state, &app_id, "POST", &path, &params, Some(&body)).await?;

    let request: PublishRequest = serde_json::from_str(&body)
        .map_err(|_| ApiError::bad_request("The received data is incorrect."))?;

    let (name, data) = match (request.name, request.data) {
        (Some(name), Some(data)) => (name, data),
        _ => return Err(ApiError::bad_request("The received data is incorrect.")),
    };

    let channels = match (request.channel, request.channels) {
        (Some(channel), None) => vec![channel],
        (None, Some(channels)) if !channels.is_empty() => channels,
        _ => return Err(ApiError::bad_request("The received data is incorrect.")),
    };

    let max_channels = state.config.event_limits.max_channels_at_once;
    if channels.len() > max_channels {
        return Err(ApiError::bad_request(format!(
            "Cannot broadcast a message to more than {max_channels} channels at once"
        )));
    }

    let max_name = state.config.event_limits.max_name_length;
    if name.len() > max_name {
        return Err(ApiError::bad_request(format!(
            "The event name is longer than {max_name} characters."
        )));
    }

    let max_kb = state.config.event_limits.max_payload_kb;
    if data_to_bytes(&data) as f64 / 1024.0 > max_kb {
        return Err(ApiError::bad_request(format!(
            "The event data is greater than {max_kb} KB."
        )));
    }

    // Pusher clients JSON-encode structured payloads inside the data string;
    // decode those, and pass any other string through verbatim.
    let payload = match &data {
        Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| data.clone()),
        other => other.clone(),
    };

    let result = state
        .limiter
        .consume_backend_event_points(&app, channels.len() as u32)
        .await;
    if let ConsumeResult::Denied(_) = result {
        return Err(ApiError::too_many_requests(
            "Too many requests",
            result.headers(),
        ));
    }
    let headers = result.headers();

    // An excluded socket id only applies if it names a live session of this
    // same app.
    let except = request
        .socket_id
        .filter(|id| state.sessions.find_in_namespace(&app.key, id).is_some());

    for channel in &channels {
        let delivered = state.sessions.broadcast(
            &app.key,
            channel,
            &ServerMessage::broadcast(&name, channel, payload.clone()),
            except.as_deref(),
        );
        tracing::debug!(app_id = %app.id, channel, event = %name, delivered, "event published");
        state.stats.mark_ws_message(&app);
    }
    state.stats.mark_api_message(&app);

    Ok((AppendHeaders(headers), Json(json!({ "message": "ok" }))))
}
