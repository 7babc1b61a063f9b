//! Read-only channel inspection endpoints.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::response::{AppendHeaders, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use crate::channels::ChannelKind;
use crate::error::ApiError;
use crate::AppState;

use super::{authorized_app, consume_read_points};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/apps/{app_id}/channels", get(list_channels))
        .route("/apps/{app_id}/channels/{channel_name}", get(get_channel))
        .route(
            "/apps/{app_id}/channels/{channel_name}/users",
            get(list_users),
        )
}

// ---------------------------------------------------------------------------
// GET /apps/:app_id/channels
// ---------------------------------------------------------------------------

async fn list_channels(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let path = format!("/apps/{app_id}/channels");
    let app = authorized_app(&state, &app_id, "GET", &path, &params, None).await?;
    let headers = consume_read_points(&state, &app).await?;

    let prefix = params.get("filter_by_prefix").cloned().unwrap_or_default();

    let mut channels = Map::new();
    for (name, subscription_count) in state.sessions.channels(&app.key) {
        if !name.starts_with(&prefix) {
            continue;
        }
        channels.insert(
            name,
            json!({ "subscription_count": subscription_count, "occupied": true }),
        );
    }

    Ok((
        AppendHeaders(headers),
        Json(json!({ "channels": Value::Object(channels) })),
    ))
}

// ---------------------------------------------------------------------------
// GET /apps/:app_id/channels/:channel_name
// ---------------------------------------------------------------------------

async fn get_channel(
    State(state): State<AppState>,
    Path((app_id, channel_name)): Path<(String, String)>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let path = format!("/apps/{app_id}/channels/{channel_name}");
    let app = authorized_app(&state, &app_id, "GET", &path, &params, None).await?;
    let headers = consume_read_points(&state, &app).await?;

    let subscription_count = state.sessions.room_size(&app.key, &channel_name);
    let mut body = json!({
        "subscription_count": subscription_count,
        "occupied": subscription_count > 0,
    });

    if ChannelKind::of(&channel_name) == ChannelKind::Presence {
        let members = state
            .presence
            .get_members(&app.key, &channel_name)
            .await
            .map_err(|err| {
                tracing::error!(%err, channel = channel_name, "presence roster lookup failed");
                ApiError::internal("An internal error occurred")
            })?;
        body["user_count"] = json!(members.len());
    }

    Ok((AppendHeaders(headers), Json(body)))
}

// ---------------------------------------------------------------------------
// GET /apps/:app_id/channels/:channel_name/users
// ---------------------------------------------------------------------------

async fn list_users(
    State(state): State<AppState>,
    Path((app_id, channel_name)): Path<(String, String)>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let path = format!("/apps/{app_id}/channels/{channel_name}/users");
    let app = authorized_app(&state, &app_id, "GET", &path, &params, None).await?;

    if ChannelKind::of(&channel_name) != ChannelKind::Presence {
        return Err(ApiError::bad_request(
            "User list is only possible for Presence Channels",
        ));
    }

    let headers = consume_read_points(&state, &app).await?;

    let users = state
        .presence
        .get_members(&app.key, &channel_name)
        .await
        .map_err(|err| {
            tracing::error!(%err, channel = channel_name, "presence roster lookup failed");
            ApiError::internal("An internal error occurred")
        })?;

    Ok((AppendHeaders(headers), Json(json!({ "users": users }))))
}
