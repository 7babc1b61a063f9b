//! Outbound webhook delivery.
//!
//! Delivery is fire-and-forget: each batch is posted from a spawned task and
//! failures are logged, never surfaced to the session that triggered them.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::apps::App;
use crate::auth::token;

pub const CLIENT_EVENT_WEBHOOK: &str = "client-event";

pub const KEY_HEADER: &str = "x-riptide-key";
pub const SIGNATURE_HEADER: &str = "x-riptide-signature";

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub name: String,
    pub channel: String,
    pub data: Value,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    time_ms: i64,
    events: Vec<WebhookEvent>,
}

pub struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Post `events` to every webhook the app has registered for
    /// `event_type`. The payload is signed with the app secret so receivers
    /// can verify origin.
    pub fn send(&self, app: &Arc<App>, event_type: &str, events: Vec<WebhookEvent>) {
        let hooks: Vec<String> = app
            .webhooks_for(event_type)
            .into_iter()
            .map(|w| w.url.clone())
            .collect();
        if hooks.is_empty() {
            return;
        }

        let payload = WebhookPayload {
            time_ms: chrono::Utc::now().timestamp_millis(),
            events,
        };
        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(app_id = %app.id, %err, "failed to serialize webhook payload");
                return;
            }
        };
        let signature = token::sign(&app.secret, &body);

        for url in hooks {
            let request = self
                .client
                .post(&url)
                .header("content-type", "application/json")
                .header(KEY_HEADER, app.key.clone())
                .header(SIGNATURE_HEADER, signature.clone())
                .body(body.clone());
            let app_id = app.id.clone();

            tokio::spawn(async move {
                match request.send().await {
                    Ok(response) if !response.status().is_success() => {
                        tracing::warn!(
                            app_id,
                            url,
                            status = %response.status(),
                            "webhook endpoint returned an error"
                        );
                    }
                    Ok(_) => {
                        tracing::debug!(app_id, url, "webhook delivered");
                    }
                    Err(err) => {
                        tracing::warn!(app_id, url, %err, "webhook delivery failed");
                    }
                }
            });
        }
    }
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}
