//! In-memory backend and readiness probe for tests and demos.
//!
//! `MockBackend` keeps a single instance address and records every call.
//! Calls can be held in flight with [`MockBackend::pause`] to observe the
//! session while an operation is outstanding, and individual operations can
//! be scripted to fail once.
//!
//! ```rust,ignore
//! let backend = MockBackend::new("svc:6006/flexy-vis/demo/");
//! backend.fail_next(MockCall::Start, "quota exceeded").await;
//! ```

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};

use super::{AppInfo, VisBackend};
use crate::readiness::ReadinessProbe;

/// Backend operation recorded by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    /// `get_app`
    Get,
    /// `start_app`
    Start,
    /// `delete_app`
    Delete,
}

/// Simulated backend holding at most one instance.
pub struct MockBackend {
    current: RwLock<String>,
    start_address: String,
    failures: RwLock<HashMap<MockCall, String>>,
    calls: RwLock<Vec<(MockCall, String)>>,
    gate: RwLock<Option<Arc<Semaphore>>>,
}

impl MockBackend {
    /// Create a backend with no instance; `start_app` provisions `start_address`.
    pub fn new(start_address: impl Into<String>) -> Self {
        Self::build(String::new(), start_address.into())
    }

    /// Create a backend that already has an instance at `address`.
    pub fn with_instance(address: impl Into<String>) -> Self {
        let address = address.into();
        Self::build(address.clone(), address)
    }

    fn build(current: String, start_address: String) -> Self {
        Self {
            current: RwLock::new(current),
            start_address,
            failures: RwLock::new(HashMap::new()),
            calls: RwLock::new(Vec::new()),
            gate: RwLock::new(None),
        }
    }

    /// Make the next call of `call` fail with `message`.
    pub async fn fail_next(&self, call: MockCall, message: impl Into<String>) {
        self.failures.write().await.insert(call, message.into());
    }

    /// Hold every subsequent call until [`resume`](Self::resume).
    pub async fn pause(&self) {
        *self.gate.write().await = Some(Arc::new(Semaphore::new(0)));
    }

    /// Release held calls.
    pub async fn resume(&self) {
        if let Some(gate) = self.gate.write().await.take() {
            gate.close();
        }
    }

    /// Swap the instance out from under the client, as a backend-side
    /// restart would.
    pub async fn replace_instance(&self, address: impl Into<String>) {
        *self.current.write().await = address.into();
    }

    /// Current instance address (empty if none).
    pub async fn pod_address(&self) -> String {
        self.current.read().await.clone()
    }

    /// Number of times `call` was invoked.
    pub async fn call_count(&self, call: MockCall) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|(c, _)| *c == call)
            .count()
    }

    /// Query strings received, in order.
    pub async fn queries(&self) -> Vec<String> {
        self.calls.read().await.iter().map(|(_, q)| q.clone()).collect()
    }

    async fn enter(&self, call: MockCall, query: &str) -> Result<()> {
        self.calls.write().await.push((call, query.to_string()));

        let gate = self.gate.read().await.clone();
        if let Some(gate) = gate {
            // Closed on resume; the error just means "go ahead"
            let _ = gate.acquire().await;
        }

        match self.failures.write().await.remove(&call) {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VisBackend for MockBackend {
    async fn get_app(&self, query: &str) -> Result<AppInfo> {
        self.enter(MockCall::Get, query).await?;
        Ok(AppInfo {
            pod_address: self.current.read().await.clone(),
        })
    }

    async fn start_app(&self, query: &str) -> Result<()> {
        self.enter(MockCall::Start, query).await?;
        *self.current.write().await = self.start_address.clone();
        Ok(())
    }

    async fn delete_app(&self, query: &str) -> Result<()> {
        self.enter(MockCall::Delete, query).await?;
        self.current.write().await.clear();
        Ok(())
    }
}

/// Readiness probe with a switchable answer.
#[derive(Default)]
pub struct MockProbe {
    ready: AtomicBool,
    failing: AtomicBool,
    calls: AtomicUsize,
    last_url: RwLock<Option<String>>,
}

impl MockProbe {
    /// Create a probe that reports not-ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the readiness answer.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Make every probe fail until switched off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of probes performed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// URL of the most recent probe.
    pub async fn last_url(&self) -> Option<String> {
        self.last_url.read().await.clone()
    }
}

#[async_trait]
impl ReadinessProbe for MockProbe {
    async fn is_ready(&self, proxy_url: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_url.write().await = Some(proxy_url.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("probe connection refused"));
        }
        Ok(self.ready.load(Ordering::SeqCst))
    }
}
