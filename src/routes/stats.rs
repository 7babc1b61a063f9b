//! Per-app stats endpoints. Signed like the other `/apps` routes and only
//! served for apps that opted in.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::apps::App;
use crate::error::ApiError;
use crate::AppState;

use super::authorized_app;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/apps/{app_id}/stats", get(stats_range))
        .route("/apps/{app_id}/stats/current", get(stats_current))
}

fn ensure_stats_enabled(state: &AppState, app: &App) -> Result<(), ApiError> {
    if !state.config.stats_enabled || !app.enable_stats {
        return Err(ApiError::bad_request("Stats are not enabled for the app."));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// GET /apps/:app_id/stats
// ---------------------------------------------------------------------------

async fn stats_range(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let path = format!("/apps/{app_id}/stats");
    let app = authorized_app(&state, &app_id, "GET", &path, &params, None).await?;
    ensure_stats_enabled(&state, &app)?;

    let start: i64 = params
        .get("start")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let end: i64 = params
        .get("end")
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

    let points = state.stats.snapshots(&app.id, start, end);
    Ok(Json(json!({ "stats": points })))
}

// ---------------------------------------------------------------------------
// GET /apps/:app_id/stats/current
// ---------------------------------------------------------------------------

async fn stats_current(
    State(state): State<AppState>,
    Path(app_id): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let path = format!("/apps/{app_id}/stats/current");
    let app = authorized_app(&state, &app_id, "GET", &path, &params, None).await?;
    ensure_stats_enabled(&state, &app)?;

    let current = state.stats.current(&app.id);
    Ok(Json(json!({ "stats": current })))
}
