//! # flexy_vis
//!
//! Client-side controller for on-demand visualization instances. A backend
//! provisions one pod per visualization; this crate tracks whether that pod
//! exists and is ready, lets a user start or delete it, and derives the URL
//! under which the ingress exposes it.
//!
//! ## Crate Structure
//!
//! - **`session`**: The `VisSession` state machine (mount, start, poll,
//!   delete, teardown) and its presentation-neutral `SessionView`.
//! - **`proxy`**: Maps an opaque pod address to `<base domain>/flexy-vis/<id>/`.
//! - **`request`**: `VisualizationRequest` and backend query encoding.
//! - **`backend`**: The `VisBackend` trait with HTTP and mock implementations.
//! - **`readiness`**: Pluggable readiness probes.
//! - **`config`**: Figment-based configuration (`config/flexy_vis.toml` +
//!   `FLEXY_VIS_*` environment variables).
//! - **`logging`**: tracing-subscriber initialization.
//! - **`error`**: The crate-wide `VisError` enum.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use flexy_vis::{
//!     backend::HttpBackend, config::VisConfig, readiness::probe_from_config,
//!     request::VisualizationRequest, session::VisSession,
//! };
//!
//! # async fn run() -> flexy_vis::VisResult<()> {
//! let config = VisConfig::load()?;
//! let backend = Arc::new(HttpBackend::from_config(&config)?);
//! let probe = probe_from_config(&config)?;
//! let request = VisualizationRequest::new("https://git.example.com/vis.git", "app.py", "kubeflow");
//!
//! let mut session = VisSession::new(vec![request], backend, probe, config.session())?;
//! session.mount()?;
//! session.run_until_idle().await;
//! if session.view().can_start {
//!     session.start()?;
//!     session.run_until_idle().await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod readiness;
pub mod request;
pub mod session;

pub use backend::{AppInfo, HttpBackend, MockBackend, VisBackend};
pub use config::{ProbeKind, SessionConfig, VisConfig};
pub use error::{VisError, VisResult};
pub use proxy::{make_proxy_url, AddressError, DEFAULT_BASE_DOMAIN};
pub use readiness::{HttpReadinessProbe, NeverReady, ReadinessProbe};
pub use request::VisualizationRequest;
pub use session::{Completion, SessionState, SessionView, VisSession, VisState};
