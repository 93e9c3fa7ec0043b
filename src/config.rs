//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. `config/flexy_vis.toml` (base configuration, optional)
//! 2. Environment variables (prefixed with `FLEXY_VIS_`)
//!
//! Every key has a default, so an empty environment yields a usable config.
//!
//! # Example
//! ```no_run
//! use flexy_vis::config::VisConfig;
//!
//! let config = VisConfig::load()?;
//! config.validate()?;
//! println!("Proxy base: {}", config.base_domain);
//! # Ok::<(), flexy_vis::VisError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::Level;

use crate::error::{VisError, VisResult};
use crate::proxy::DEFAULT_BASE_DOMAIN;

/// Default configuration file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/flexy_vis.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "FLEXY_VIS_";

/// Accepted values for `log_level`, case-insensitive.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Parse a `log_level` value into a tracing [`Level`].
pub fn parse_log_level(level: &str) -> VisResult<Level> {
    LOG_LEVELS
        .iter()
        .find(|name| name.eq_ignore_ascii_case(level))
        .and_then(|name| name.parse().ok())
        .ok_or_else(|| {
            VisError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                level,
                LOG_LEVELS.join(", ")
            ))
        })
}

/// Strategy used to detect instance readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// HEAD request against the proxy URL
    Http,
    /// Never report ready
    Disabled,
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisConfig {
    /// Ingress base domain prepended to `/flexy-vis/<id>/`
    #[serde(default = "default_base_domain")]
    pub base_domain: String,
    /// Readiness polling interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Base URL of the backend API serving `apps/flexy-vis`
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Per-request timeout for backend and probe calls in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Readiness detection strategy
    #[serde(default = "default_probe")]
    pub readiness_probe: ProbeKind,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_base_domain() -> String {
    DEFAULT_BASE_DOMAIN.to_string()
}

fn default_poll_interval() -> u64 {
    5000
}

fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_probe() -> ProbeKind {
    ProbeKind::Http
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for VisConfig {
    fn default() -> Self {
        Self {
            base_domain: default_base_domain(),
            poll_interval_ms: default_poll_interval(),
            api_base_url: default_api_base_url(),
            request_timeout_ms: default_request_timeout(),
            readiness_probe: default_probe(),
            log_level: default_log_level(),
        }
    }
}

impl VisConfig {
    /// Load configuration from `config/flexy_vis.toml` and environment variables
    ///
    /// Example override: `FLEXY_VIS_POLL_INTERVAL_MS=2000`
    pub fn load() -> VisResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    /// The merged result is validated before it is returned.
    pub fn load_from<P: AsRef<Path>>(path: P) -> VisResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(VisConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> VisResult<()> {
        parse_log_level(&self.log_level)?;

        if self.poll_interval_ms == 0 {
            return Err(VisError::Configuration(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(VisError::Configuration(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }

        for (key, value) in [
            ("base_domain", &self.base_domain),
            ("api_base_url", &self.api_base_url),
        ] {
            let url = url::Url::parse(value).map_err(|e| {
                VisError::Configuration(format!("Invalid {key} '{value}': {e}"))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(VisError::Configuration(format!(
                    "Unsupported scheme '{}' in {key} (use http or https)",
                    url.scheme()
                )));
            }
        }

        Ok(())
    }

    /// Readiness polling interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// The subset of settings a session needs.
    #[must_use]
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: self.poll_interval(),
            base_domain: self.base_domain.clone(),
        }
    }
}

/// Session-facing settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How often readiness is polled while an instance is starting
    pub poll_interval: Duration,
    /// Ingress base domain for proxy URLs
    pub base_domain: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        VisConfig::default().session()
    }
}

impl SessionConfig {
    /// Override the polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the base domain.
    #[must_use]
    pub fn with_base_domain(mut self, base_domain: impl Into<String>) -> Self {
        self.base_domain = base_domain.into();
        self
    }
}
