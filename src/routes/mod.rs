pub mod channels;
pub mod events;
pub mod health;
pub mod stats;

use std::collections::BTreeMap;

use axum::Router;

use crate::apps::App;
use crate::auth::request;
use crate::error::ApiError;
use crate::limiter::ConsumeResult;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(channels::router())
        .merge(events::router())
        .merge(stats::router())
}

/// Resolve the app for a signed request and verify the signature. Every
/// `/apps/{appId}/...` endpoint goes through here before touching state.
pub(crate) async fn authorized_app(
    state: &AppState,
    app_id: &str,
    method: &str,
    path: &str,
    params: &BTreeMap<String, String>,
    raw_body: Option<&str>,
) -> Result<App, ApiError> {
    let app = state
        .apps
        .find_by_id(app_id)
        .await?
        .ok_or_else(|| ApiError::not_found("App not found"))?;

    if !request::verify(&app, method, path, params, raw_body) {
        tracing::debug!(app_id, path, "request signature rejected");
        return Err(ApiError::unauthorized("Unauthorized"));
    }

    Ok(app)
}

/// Charge the app's read-request budget. Denials become 429 responses that
/// carry the quota headers; grants hand the headers back for the success
/// response.
pub(crate) async fn consume_read_points(
    state: &AppState,
    app: &App,
) -> Result<Vec<(&'static str, String)>, ApiError> {
    let result = state.limiter.consume_read_request_points(app, 1).await;
    match result {
        ConsumeResult::Denied(_) => Err(ApiError::too_many_requests(
            "Too many requests",
            result.headers(),
        )),
        granted => Ok(granted.headers()),
    }
}
