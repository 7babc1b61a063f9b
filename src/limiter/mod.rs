//! Points-based quotas, replenished on a fixed 60-second window.

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::apps::App;
use crate::config::RateLimiterKind;

/// The window every scope's budget replenishes on.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Outcome details of a consume call, enough to emit `Retry-After` and
/// `X-RateLimit-*` response headers.
#[derive(Debug, Clone)]
pub struct Consumption {
    pub limit: i64,
    pub remaining: i64,
    pub reset_after: Duration,
}

impl Consumption {
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Retry-After", format!("{}", self.reset_after.as_secs())),
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
        ]
    }
}

#[derive(Debug)]
pub enum ConsumeResult {
    /// The scope is configured with a negative budget: no counting, no headers.
    Unlimited,
    Granted(Consumption),
    Denied(Consumption),
}

impl ConsumeResult {
    pub fn granted(&self) -> bool {
        !matches!(self, ConsumeResult::Denied(_))
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            ConsumeResult::Unlimited => Vec::new(),
            ConsumeResult::Granted(c) | ConsumeResult::Denied(c) => c.headers(),
        }
    }
}

/// Backing store for quota counters. `consume` must be atomic: two racing
/// calls may never both observe the same pre-consumption balance.
#[async_trait]
pub trait RateLimiterDriver: Send + Sync {
    async fn consume(&self, key: &str, max_per_minute: i64, points: u32) -> ConsumeResult;
}

/// Facade exposing the three named scopes. The budget is read from the app at
/// consumption time so refreshed app configuration takes effect immediately.
pub struct RateLimiter {
    driver: Arc<dyn RateLimiterDriver>,
}

impl RateLimiter {
    pub fn new(driver: Arc<dyn RateLimiterDriver>) -> Self {
        Self { driver }
    }

    pub fn build(kind: RateLimiterKind) -> Self {
        match kind {
            RateLimiterKind::Memory => Self::new(Arc::new(memory::MemoryRateLimiter::new())),
        }
    }

    /// Backend-published events; one budget shared by every session of the app.
    pub async fn consume_backend_event_points(&self, app: &App, points: u32) -> ConsumeResult {
        self.driver
            .consume(
                &format!("backend:events:{}", app.id),
                app.max_backend_events_per_minute,
                points,
            )
            .await
    }

    /// Client events; each connected socket gets its own budget.
    pub async fn consume_frontend_event_points(
        &self,
        app: &App,
        socket_id: &str,
        points: u32,
    ) -> ConsumeResult {
        self.driver
            .consume(
                &format!("frontend:events:{socket_id}:{}", app.id),
                app.max_client_events_per_minute,
                points,
            )
            .await
    }

    /// Read-only HTTP API requests; one budget per app.
    pub async fn consume_read_request_points(&self, app: &App, points: u32) -> ConsumeResult {
        self.driver
            .consume(
                &format!("backend:request_read:{}", app.id),
                app.max_read_requests_per_minute,
                points,
            )
            .await
    }
}
