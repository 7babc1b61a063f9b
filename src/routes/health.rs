//! Liveness, readiness, and process usage endpoints. Unsigned by design so
//! orchestrators can probe them.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/usage", get(usage))
}

async fn health() -> &'static str {
    "OK"
}

/// Ready flips to 503 the moment shutdown starts so load balancers stop
/// routing new connections here.
async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.closing.load(Ordering::Relaxed) {
        (StatusCode::SERVICE_UNAVAILABLE, "Closing").into_response()
    } else {
        "OK".into_response()
    }
}

async fn usage() -> Json<Value> {
    Json(json!({ "memory": memory_usage() }))
}

/// Resident and virtual size of this process, in bytes. Only procfs platforms
/// report anything; elsewhere the field is null.
fn memory_usage() -> Value {
    let statm = match std::fs::read_to_string("/proc/self/statm") {
        Ok(statm) => statm,
        Err(_) => return Value::Null,
    };

    let mut fields = statm.split_whitespace();
    let vsize_pages: u64 = match fields.next().and_then(|f| f.parse().ok()) {
        Some(pages) => pages,
        None => return Value::Null,
    };
    let rss_pages: u64 = match fields.next().and_then(|f| f.parse().ok()) {
        Some(pages) => pages,
        None => return Value::Null,
    };

    // statm reports pages.
    let page_size = 4096u64;
    json!({
        "rss": rss_pages * page_size,
        "vsize": vsize_pages * page_size,
    })
}
