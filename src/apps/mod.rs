//! Tenant apps and the registry used to look them up.

pub mod http;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{AppRegistryKind, Config};

/// A webhook endpoint registered for an app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Webhook {
    pub url: String,
    pub event_type: String,
}

/// A tenant of the gateway. Immutable once loaded for a session; quotas with
/// a negative value mean "unlimited".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: String,
    pub key: String,
    pub secret: String,
    #[serde(default = "unlimited", alias = "max_connections")]
    pub max_connections: i64,
    #[serde(default, alias = "enable_stats")]
    pub enable_stats: bool,
    #[serde(
        default = "client_messages_default",
        alias = "enable_client_messages"
    )]
    pub enable_client_messages: bool,
    #[serde(
        default = "unlimited",
        alias = "maxBackendEventsPerMin",
        alias = "max_backend_events_per_min"
    )]
    pub max_backend_events_per_minute: i64,
    #[serde(
        default = "unlimited",
        alias = "maxClientEventsPerMin",
        alias = "max_client_events_per_min"
    )]
    pub max_client_events_per_minute: i64,
    #[serde(
        default = "unlimited",
        alias = "maxReadReqPerMin",
        alias = "max_read_req_per_min"
    )]
    pub max_read_requests_per_minute: i64,
    #[serde(default)]
    pub webhooks: Vec<Webhook>,
}

fn unlimited() -> i64 {
    -1
}

// Client messages are on unless the app record says otherwise. The default is
// defined here, once, instead of being coerced at every read site.
fn client_messages_default() -> bool {
    true
}

impl App {
    /// Webhooks registered for a given event type.
    pub fn webhooks_for(&self, event_type: &str) -> Vec<&Webhook> {
        self.webhooks
            .iter()
            .filter(|w| w.event_type == event_type)
            .collect()
    }
}

/// Failure while talking to the registry backend. Distinct from "app not
/// found", which is a successful `Ok(None)` lookup.
#[derive(Debug)]
pub struct RegistryError(pub String);

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app registry error: {}", self.0)
    }
}

impl std::error::Error for RegistryError {}

/// Lookup interface for tenant apps. Implementations may hit the network;
/// callers must treat lookups as suspension points.
#[async_trait]
pub trait AppRegistry: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<App>, RegistryError>;
    async fn find_by_key(&self, key: &str) -> Result<Option<App>, RegistryError>;
}

/// Build the registry selected by the configuration.
pub fn build(config: &Config) -> Arc<dyn AppRegistry> {
    match config.app_registry_driver {
        AppRegistryKind::Memory => Arc::new(memory::MemoryAppRegistry::from_config(config)),
        AppRegistryKind::Http => Arc::new(http::HttpAppRegistry::from_config(config)),
    }
}
