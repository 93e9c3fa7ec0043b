//! Backend API seam for visualization instances.
//!
//! The session never talks HTTP directly. It drives a [`VisBackend`], which
//! the host wires to either the real API ([`HttpBackend`]) or an in-memory
//! stand-in ([`MockBackend`]) for tests and demos.
//!
//! Every call takes the encoded query string produced by
//! [`crate::request::build_query`]; the backend uses it to identify the
//! instance. Failures carry a human-readable message, shown to the user as-is.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod http;
pub mod mock;

pub use http::HttpBackend;
pub use mock::{MockBackend, MockCall};

/// Instance lookup result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    /// Opaque address of the instance; empty when none exists
    #[serde(default)]
    pub pod_address: String,
}

impl AppInfo {
    /// Returns true if the backend reported an instance.
    #[must_use]
    pub fn exists(&self) -> bool {
        !self.pod_address.is_empty()
    }
}

/// Operations the backend exposes for visualization instances.
#[async_trait]
pub trait VisBackend: Send + Sync {
    /// Look up the instance for `query`.
    async fn get_app(&self, query: &str) -> Result<AppInfo>;

    /// Ask the backend to create the instance for `query`.
    async fn start_app(&self, query: &str) -> Result<()>;

    /// Ask the backend to delete the instance for `query`.
    async fn delete_app(&self, query: &str) -> Result<()>;
}
