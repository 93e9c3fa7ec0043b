//! Error types for the visualization session controller.
//!
//! `VisError` is the crate-wide error enum. It covers three groups:
//!
//! - **Misuse of the session**: an action requested in a state that does not
//!   allow it (`Busy`, `InvalidTransition`, `DeleteNotConfirmed`, `NotMounted`,
//!   `AlreadyMounted`, `TornDown`). These leave the session untouched.
//! - **Setup failures**: wrapped `reqwest` and `figment` errors, invalid
//!   configuration values and logging initialization.
//! - **Address derivation**: `Address` wraps [`AddressError`] when
//!   `VisSession::open_url` cannot derive a proxy URL.
//!
//! Backend and probe failures never become a `VisError`. Collaborator traits
//! (`VisBackend`, `ReadinessProbe`) return `anyhow::Result` and the session
//! stores the display string in `error_message`.

use thiserror::Error;

use crate::proxy::AddressError;

/// Convenience alias for results using the crate error type.
pub type VisResult<T> = std::result::Result<T, VisError>;

/// Errors returned by the session, configuration and collaborators.
#[derive(Error, Debug)]
pub enum VisError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to initialize tracing: {0}")]
    Logging(String),

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("At least one visualization request is required")]
    NoRequests,

    #[error("Another operation is in progress")]
    Busy,

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("Delete must be confirmed before it can proceed")]
    DeleteNotConfirmed,

    #[error("Session has not been mounted")]
    NotMounted,

    #[error("Session is already mounted")]
    AlreadyMounted,

    #[error("Session has been torn down")]
    TornDown,

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

impl From<figment::Error> for VisError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}
