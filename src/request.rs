//! Visualization requests and backend query encoding.
//!
//! A [`VisualizationRequest`] names the artifact to visualize and the
//! parameters passed to its entry point. The backend identifies an instance by
//! a query string built from the request:
//!
//! ```text
//! source=<enc>&entrypoint=<enc>&namespace=<enc>&<params>
//! ```
//!
//! `<params>` starts out as [`encode_params`] of the request parameters but is
//! user-editable afterwards and is appended verbatim.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input describing one visualization to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationRequest {
    /// Identifier of the artifact or content to visualize (e.g. a git URL)
    pub source: String,
    /// Entry point inside the source
    pub entry_point: String,
    /// Namespace the instance is created in
    pub namespace: String,
    /// Parameters forwarded to the entry point
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl VisualizationRequest {
    /// Create a request without parameters.
    pub fn new(
        source: impl Into<String>,
        entry_point: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            entry_point: entry_point.into(),
            namespace: namespace.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The initial editable parameter string for this request.
    #[must_use]
    pub fn params_url_str(&self) -> String {
        encode_params(&self.params)
    }
}

/// Encode parameters as `key=value` pairs sorted by key.
///
/// Values are percent-encoded; keys are assumed to be URL-safe already.
/// Everything outside the RFC 3986 unreserved set is escaped, including
/// `!*'()`, so `it's` becomes `it%27s` where a browser's
/// `encodeURIComponent` would leave the quote alone.
pub fn encode_params<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut pairs: Vec<_> = params.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the full backend query string.
///
/// `source`, `entry_point` and `namespace` are encoded here; `params_url_str`
/// is appended as-is.
pub fn build_query(
    source: &str,
    entry_point: &str,
    namespace: &str,
    params_url_str: &str,
) -> String {
    format!(
        "source={}&entrypoint={}&namespace={}&{}",
        urlencoding::encode(source),
        urlencoding::encode(entry_point),
        urlencoding::encode(namespace),
        params_url_str
    )
}
