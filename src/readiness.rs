//! Readiness detection strategies.
//!
//! An instance reported by the backend may still be booting. While a session
//! has an instance that is not yet ready, every poll tick asks a
//! [`ReadinessProbe`] whether the instance's proxy URL answers.
//!
//! - [`HttpReadinessProbe`]: `HEAD` request, ready on any 2xx status.
//! - [`NeverReady`]: never reports ready; the instance stays "starting" until
//!   the user opens it anyway.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ProbeKind, VisConfig};
use crate::error::VisResult;

/// Decides whether an instance behind `proxy_url` can serve requests.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Returns `Ok(true)` once the instance answers.
    async fn is_ready(&self, proxy_url: &str) -> Result<bool>;
}

/// Probe that issues a `HEAD` request against the proxy URL.
#[derive(Debug, Clone)]
pub struct HttpReadinessProbe {
    http_client: Client,
}

impl HttpReadinessProbe {
    /// Create a probe with the given per-request timeout.
    pub fn new(timeout: Duration) -> VisResult<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }

    /// Create a probe reusing an existing reqwest client.
    pub fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl ReadinessProbe for HttpReadinessProbe {
    async fn is_ready(&self, proxy_url: &str) -> Result<bool> {
        let response = self.http_client.head(proxy_url).send().await?;
        tracing::trace!(url = proxy_url, status = %response.status(), "readiness probe");
        Ok(response.status().is_success())
    }
}

/// Probe that never reports ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReady;

#[async_trait]
impl ReadinessProbe for NeverReady {
    async fn is_ready(&self, _proxy_url: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Build the probe selected in configuration.
pub fn probe_from_config(config: &VisConfig) -> VisResult<Arc<dyn ReadinessProbe>> {
    Ok(match config.readiness_probe {
        ProbeKind::Http => Arc::new(HttpReadinessProbe::new(config.request_timeout())?),
        ProbeKind::Disabled => Arc::new(NeverReady),
    })
}
