//! Proxy URL derivation for visualization instances.
//!
//! The backend reports an instance location as an opaque address string, for
//! example `foo.svc.cluster.local:6006/flexy-vis/abc-123/`. Browsers cannot
//! reach that address directly; the ingress exposes each instance under
//! `<base domain>/flexy-vis/<id>/`. [`make_proxy_url`] extracts that path
//! segment and joins it onto the configured base domain.
//!
//! The address is never parsed as a URL. Some hosting environments mangle the
//! `//` after a scheme, so only the `/flexy-vis/<id>/` segment is trusted and
//! everything before or after it is discarded.
//!
//! # Example
//!
//! ```
//! use flexy_vis::proxy::make_proxy_url;
//!
//! let url = make_proxy_url(
//!     "foo.svc.cluster.local:6006/flexy-vis/abc-123/",
//!     "http://ambassador.ingress.dev.grabds.com",
//! )?;
//! assert_eq!(url, "http://ambassador.ingress.dev.grabds.com/flexy-vis/abc-123/");
//! # Ok::<(), flexy_vis::proxy::AddressError>(())
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Default ingress base domain used when no configuration overrides it.
pub const DEFAULT_BASE_DOMAIN: &str = "http://ambassador.ingress.dev.grabds.com";

/// Literal path prefix under which the ingress routes visualization instances.
pub const PROXY_PATH_PREFIX: &str = "/flexy-vis/";

#[allow(clippy::expect_used)]
static PROXY_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!("{}[^/]+/", regex::escape(PROXY_PATH_PREFIX));
    Regex::new(&pattern).expect("proxy segment pattern is valid")
});

/// Address derivation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The address was empty (no instance provisioned)
    Empty,
    /// The address does not contain a `/flexy-vis/<id>/` segment
    InvalidAddressFormat(String),
}

impl std::error::Error for AddressError {}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Pod address is empty"),
            Self::InvalidAddressFormat(addr) => {
                write!(f, "Invalid podAddress format: '{addr}'")
            }
        }
    }
}

/// Extract the `/flexy-vis/<id>/` segment from a raw pod address.
///
/// Only the first occurrence is used. The segment id must be non-empty and
/// may not contain `/`.
pub fn extract_proxy_path(pod_address: &str) -> Result<&str, AddressError> {
    if pod_address.is_empty() {
        return Err(AddressError::Empty);
    }
    PROXY_SEGMENT
        .find(pod_address)
        .map(|m| m.as_str())
        .ok_or_else(|| AddressError::InvalidAddressFormat(pod_address.to_string()))
}

/// Build the browser-openable proxy URL for a pod address.
///
/// A trailing `/` on `base_domain` is dropped so the join never doubles the
/// slash.
pub fn make_proxy_url(pod_address: &str, base_domain: &str) -> Result<String, AddressError> {
    let path = extract_proxy_path(pod_address)?;
    Ok(format!("{}{}", base_domain.trim_end_matches('/'), path))
}
