//! In-memory app registry, loaded from configuration at startup.

use async_trait::async_trait;

use crate::config::Config;

use super::{App, AppRegistry, RegistryError};

/// Registry backed by a fixed list of apps. The list is parsed once from the
/// `APPS_JSON` environment variable; when it is absent a single development
/// app is used so the server works out of the box.
pub struct MemoryAppRegistry {
    apps: Vec<App>,
}

impl MemoryAppRegistry {
    pub fn new(apps: Vec<App>) -> Self {
        Self { apps }
    }

    pub fn from_config(config: &Config) -> Self {
        let apps = match &config.apps_json {
            Some(raw) => serde_json::from_str(raw)
                .unwrap_or_else(|e| panic!("APPS_JSON is not a valid app list: {e}")),
            None => vec![default_dev_app()],
        };

        Self::new(apps)
    }
}

fn default_dev_app() -> App {
    App {
        id: "riptide-app".to_string(),
        key: "riptide-app-key".to_string(),
        secret: "riptide-app-secret".to_string(),
        max_connections: -1,
        enable_stats: false,
        enable_client_messages: true,
        max_backend_events_per_minute: -1,
        max_client_events_per_minute: -1,
        max_read_requests_per_minute: -1,
        webhooks: Vec::new(),
    }
}

#[async_trait]
impl AppRegistry for MemoryAppRegistry {
    async fn find_by_id(&self, id: &str) -> Result<Option<App>, RegistryError> {
        Ok(self.apps.iter().find(|a| a.id == id).cloned())
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<App>, RegistryError> {
        Ok(self.apps.iter().find(|a| a.key == key).cloned())
    }
}
