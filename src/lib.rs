pub mod apps;
pub mod auth;
pub mod channels;
pub mod config;
pub mod error;
pub mod gateway;
pub mod limiter;
pub mod presence;
pub mod routes;
pub mod stats;
pub mod webhooks;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use apps::AppRegistry;
use channels::ChannelManager;
use config::Config;
use gateway::registry::SessionRegistry;
use limiter::RateLimiter;
use presence::PresenceStorage;
use stats::Stats;
use webhooks::WebhookSender;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub apps: Arc<dyn AppRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub presence: Arc<dyn PresenceStorage>,
    pub channels: Arc<ChannelManager>,
    pub limiter: Arc<RateLimiter>,
    pub stats: Arc<dyn Stats>,
    /// Set once shutdown starts; readiness and new upgrades key off it.
    pub closing: Arc<AtomicBool>,
}

impl AppState {
    /// Wire up every driver the configuration selects.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let apps = apps::build(&config);
        let sessions = Arc::new(SessionRegistry::new());
        let presence = presence::build(config.presence_storage_driver, sessions.clone());
        let limiter = Arc::new(RateLimiter::build(config.rate_limiter_driver));
        let stats = stats::build(&config);
        let webhooks = Arc::new(WebhookSender::new());
        let channels = Arc::new(ChannelManager::new(
            sessions.clone(),
            presence.clone(),
            limiter.clone(),
            stats.clone(),
            webhooks,
            config.clone(),
        ));

        Self {
            config,
            apps,
            sessions,
            presence,
            channels,
            limiter,
            stats,
            closing: Arc::new(AtomicBool::new(false)),
        }
    }
}
