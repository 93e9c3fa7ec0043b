//! HTTP implementation of the backend seam.
//!
//! All three operations hit the same resource with a different method:
//!
//! | Operation    | Request                                 |
//! |--------------|-----------------------------------------|
//! | `get_app`    | `GET {api}/apps/flexy-vis?{query}`      |
//! | `start_app`  | `POST {api}/apps/flexy-vis?{query}`     |
//! | `delete_app` | `DELETE {api}/apps/flexy-vis?{query}`   |
//!
//! Non-2xx responses fail with the response body as the error message.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use std::time::Duration;

use super::{AppInfo, VisBackend};
use crate::config::VisConfig;
use crate::error::VisResult;

const APPS_PATH: &str = "apps/flexy-vis";

/// Backend client for the `apps/flexy-vis` API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    http_client: Client,
}

impl HttpBackend {
    /// Create a client for the API at `base_url` with the given request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> VisResult<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, http_client))
    }

    /// Create a client reusing an existing reqwest client.
    pub fn with_client(base_url: impl Into<String>, http_client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http_client,
        }
    }

    /// Create a client from loaded configuration.
    pub fn from_config(config: &VisConfig) -> VisResult<Self> {
        Self::new(config.api_base_url.clone(), config.request_timeout())
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, query: &str) -> String {
        format!("{}/{}?{}", self.base_url, APPS_PATH, query)
    }

    async fn send(&self, method: Method, query: &str) -> Result<Response> {
        let url = self.endpoint(query);
        tracing::debug!(%method, %url, "backend request");

        let response = self.http_client.request(method, &url).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = body.trim();
        if message.is_empty() {
            Err(anyhow!("Request failed with status {}", status))
        } else {
            Err(anyhow!("{}", message))
        }
    }
}

#[async_trait]
impl VisBackend for HttpBackend {
    async fn get_app(&self, query: &str) -> Result<AppInfo> {
        let response = self.send(Method::GET, query).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(AppInfo::default());
        }
        let info = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Malformed instance lookup response: {}", e))?;
        Ok(info)
    }

    async fn start_app(&self, query: &str) -> Result<()> {
        self.send(Method::POST, query).await?;
        Ok(())
    }

    async fn delete_app(&self, query: &str) -> Result<()> {
        self.send(Method::DELETE, query).await?;
        Ok(())
    }
}
