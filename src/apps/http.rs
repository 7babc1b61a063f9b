//! App registry backed by a remote HTTP control plane.

use async_trait::async_trait;

use crate::config::Config;

use super::{App, AppRegistry, RegistryError};

/// Registry that resolves apps from an external management API. Lookups are
/// `GET {base_url}/apps/{id-or-key}` with a bearer token; a 404 means the app
/// does not exist, anything else non-2xx is a backend error.
pub struct HttpAppRegistry {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpAppRegistry {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let base_url = config
            .app_registry_url
            .clone()
            .unwrap_or_else(|| panic!("APP_REGISTRY_URL is required for the http registry driver"));

        Self::new(base_url, config.app_registry_token.clone())
    }

    async fn fetch(&self, path: &str) -> Result<Option<App>, RegistryError> {
        let mut request = self.client.get(format!("{}{path}", self.base_url));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(RegistryError(format!(
                "registry responded with {}",
                response.status()
            )));
        }

        let app = response
            .json::<App>()
            .await
            .map_err(|e| RegistryError(format!("invalid app payload: {e}")))?;

        Ok(Some(app))
    }
}

#[async_trait]
impl AppRegistry for HttpAppRegistry {
    async fn find_by_id(&self, id: &str) -> Result<Option<App>, RegistryError> {
        self.fetch(&format!("/apps/{id}")).await
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<App>, RegistryError> {
        self.fetch(&format!("/apps/key/{key}")).await
    }
}
