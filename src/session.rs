//! Visualization session state machine.
//!
//! A [`VisSession`] owns everything a UI needs to offer "start", "open" and
//! "delete" for one visualization instance:
//! - Existence lookup on mount, and again right after a successful start
//! - A recurring readiness poll while an instance is starting
//! - A `busy` flag that rejects overlapping user actions
//! - Deterministic teardown of the poll timer
//!
//! # State Machine
//!
//! ```text
//!                 start() ok + lookup
//! NoInstance ─────────────────────────> InstanceStarting
//!     ▲                                       │
//!     │                              poll tick reports ready
//!     │                                       ▼
//!     └────────── delete() ok ────────── InstanceReady
//! ```
//!
//! `busy` overlays every state while a backend call is outstanding.
//!
//! # Completions
//!
//! Backend calls, readiness probes and timer ticks run as spawned tasks and
//! report back through a channel. The owner applies them one at a time with
//! [`VisSession::handle_next`] (async) or [`VisSession::process_pending`]
//! (non-blocking, for frame-driven UIs), so every transition is applied whole.
//! After [`VisSession::teardown`] nothing is applied any more, even if a call
//! that was in flight completes later.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::backend::{AppInfo, VisBackend};
use crate::config::SessionConfig;
use crate::error::{VisError, VisResult};
use crate::proxy::make_proxy_url;
use crate::readiness::ReadinessProbe;
use crate::request::{build_query, VisualizationRequest};

/// Name shown for this viewer.
pub const DISPLAY_NAME: &str = "FlexyVis";

/// Whether several requests can be combined into one viewer.
pub const AGGREGATABLE: bool = true;

const CHANNEL_CAPACITY: usize = 16;
const UNKNOWN_ERROR: &str = "Unknown error";

/// Lifecycle state of the visualization instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisState {
    /// No instance provisioned.
    NoInstance,
    /// Instance exists but has not reported ready.
    InstanceStarting,
    /// Instance exists and answers on its proxy URL.
    InstanceReady,
}

impl VisState {
    /// Returns true if an instance exists.
    #[must_use]
    pub fn has_instance(self) -> bool {
        !matches!(self, Self::NoInstance)
    }

    /// Short description used in messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::NoInstance => "no instance exists",
            Self::InstanceStarting => "the instance is starting",
            Self::InstanceReady => "the instance is ready",
        }
    }
}

impl fmt::Display for VisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoInstance => write!(f, "NoInstance"),
            Self::InstanceStarting => write!(f, "InstanceStarting"),
            Self::InstanceReady => write!(f, "InstanceReady"),
        }
    }
}

/// Mutable session data. Only the owning [`VisSession`] changes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// A backend call is outstanding
    pub busy: bool,
    /// Opaque instance address; empty when none
    pub pod_address: String,
    /// Instance answered a readiness probe
    pub vis_ready: bool,
    /// Last failure message
    pub error_message: Option<String>,
    /// Delete confirmation is showing
    pub delete_dialog_open: bool,
    /// Editable encoded parameter string
    pub params_url_str: String,
    /// Source of the first request
    pub source: String,
    /// Entry point of the first request
    pub entry_point: String,
    /// Namespace of the first request
    pub namespace: String,
}

impl SessionState {
    /// Initial state seeded from a request.
    pub fn from_request(request: &VisualizationRequest) -> Self {
        Self {
            busy: false,
            pod_address: String::new(),
            vis_ready: false,
            error_message: None,
            delete_dialog_open: false,
            params_url_str: request.params_url_str(),
            source: request.source.clone(),
            entry_point: request.entry_point.clone(),
            namespace: request.namespace.clone(),
        }
    }

    /// Derived lifecycle state.
    #[must_use]
    pub fn vis_state(&self) -> VisState {
        if self.pod_address.is_empty() {
            VisState::NoInstance
        } else if self.vis_ready {
            VisState::InstanceReady
        } else {
            VisState::InstanceStarting
        }
    }

    /// Backend query string for the current values.
    #[must_use]
    pub fn query(&self) -> String {
        build_query(
            &self.source,
            &self.entry_point,
            &self.namespace,
            &self.params_url_str,
        )
    }
}

/// User-triggered backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Instance lookup
    Existence,
    /// Instance creation
    Start,
    /// Instance deletion
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Existence => write!(f, "lookup"),
            Self::Start => write!(f, "start"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Kind of completion applied by [`VisSession::handle_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Instance lookup finished
    Existence,
    /// Start call finished
    Start,
    /// Delete call finished
    Delete,
    /// Poll timer fired
    Tick,
    /// Readiness probe finished
    Readiness,
}

/// Result sent back by a spawned task.
enum Outcome {
    Existence(Result<AppInfo, String>),
    Started(Result<(), String>),
    Deleted(Result<(), String>),
    Tick,
    Readiness {
        pod_address: String,
        result: Result<bool, String>,
    },
}

/// Recurring timer task. Aborted when dropped.
struct PollTimer {
    handle: JoinHandle<()>,
}

impl PollTimer {
    fn spawn(runtime: &Handle, period: Duration, tx: mpsc::Sender<Outcome>) -> Self {
        let handle = runtime.spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if tx.send(Outcome::Tick).await.is_err() {
                    break;
                }
            }
        });
        Self { handle }
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Presentation-neutral affordances derived from the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Lifecycle state
    pub state: VisState,
    /// A backend call is outstanding
    pub busy: bool,
    /// The start action is enabled
    pub can_start: bool,
    /// The open action is enabled
    pub can_open: bool,
    /// The delete action is enabled
    pub can_delete: bool,
    /// Show the "instance is starting" notice
    pub starting_notice: bool,
    /// Proxy URL to open, if derivable
    pub open_url: Option<String>,
    /// Why the proxy URL could not be derived
    pub address_error: Option<String>,
    /// Last failure message
    pub error_message: Option<String>,
    /// Delete confirmation is showing
    pub delete_dialog_open: bool,
    /// Editable parameter string
    pub params_url_str: String,
    /// Caption for the start action
    pub start_label: &'static str,
}

/// Session controller for one visualization instance.
pub struct VisSession {
    state: SessionState,
    request_count: usize,
    config: SessionConfig,
    backend: Arc<dyn VisBackend>,
    probe: Arc<dyn ReadinessProbe>,
    tx: mpsc::Sender<Outcome>,
    rx: mpsc::Receiver<Outcome>,
    runtime: Option<Handle>,
    poll_timer: Option<PollTimer>,
    in_flight: Option<Operation>,
    probe_in_flight: bool,
    torn_down: bool,
}

impl VisSession {
    /// Create a session seeded from the first request.
    ///
    /// Nothing runs until [`mount`](Self::mount).
    pub fn new(
        requests: Vec<VisualizationRequest>,
        backend: Arc<dyn VisBackend>,
        probe: Arc<dyn ReadinessProbe>,
        config: SessionConfig,
    ) -> VisResult<Self> {
        let first = requests.first().ok_or(VisError::NoRequests)?;
        if config.poll_interval.is_zero() {
            return Err(VisError::Configuration(
                "poll interval must be greater than 0".to_string(),
            ));
        }
        let state = SessionState::from_request(first);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        Ok(Self {
            state,
            request_count: requests.len(),
            config,
            backend,
            probe,
            tx,
            rx,
            runtime: None,
            poll_timer: None,
            in_flight: None,
            probe_in_flight: false,
            torn_down: false,
        })
    }

    /// Look up an existing instance and start the readiness poll.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(&mut self) -> VisResult<()> {
        self.ensure_alive()?;
        if self.runtime.is_some() {
            return Err(VisError::AlreadyMounted);
        }
        let runtime = Handle::try_current().map_err(|e| VisError::NoRuntime(e.to_string()))?;

        self.poll_timer = Some(PollTimer::spawn(
            &runtime,
            self.config.poll_interval,
            self.tx.clone(),
        ));
        self.runtime = Some(runtime);
        tracing::info!(
            source = %self.state.source,
            namespace = %self.state.namespace,
            interval = ?self.config.poll_interval,
            "Visualization session mounted"
        );

        self.begin(Operation::Existence)
    }

    /// Re-run the instance lookup.
    pub fn refresh(&mut self) -> VisResult<()> {
        self.ensure_idle()?;
        self.begin(Operation::Existence)
    }

    /// Ask the backend to create the instance.
    pub fn start(&mut self) -> VisResult<()> {
        self.ensure_idle()?;
        let state = self.state.vis_state();
        if state.has_instance() {
            return Err(VisError::InvalidTransition {
                action: "start",
                state: state.label(),
            });
        }

        tracing::info!("Starting visualization");
        self.state.error_message = None;
        self.begin(Operation::Start)
    }

    /// Delete the instance. The delete dialog must be open.
    pub fn delete(&mut self) -> VisResult<()> {
        self.ensure_idle()?;
        let state = self.state.vis_state();
        if !state.has_instance() {
            return Err(VisError::InvalidTransition {
                action: "delete",
                state: state.label(),
            });
        }
        if !self.state.delete_dialog_open {
            return Err(VisError::DeleteNotConfirmed);
        }

        tracing::info!(pod_address = %self.state.pod_address, "Deleting visualization");
        self.state.error_message = None;
        self.begin(Operation::Delete)
    }

    /// Show the delete confirmation.
    pub fn open_delete_dialog(&mut self) -> VisResult<()> {
        self.ensure_alive()?;
        self.state.delete_dialog_open = true;
        Ok(())
    }

    /// Hide the delete confirmation.
    pub fn close_delete_dialog(&mut self) -> VisResult<()> {
        self.ensure_alive()?;
        self.state.delete_dialog_open = false;
        Ok(())
    }

    /// Replace the parameter string used for subsequent backend calls.
    ///
    /// The value is used verbatim.
    pub fn set_params_url(&mut self, value: impl Into<String>) -> VisResult<()> {
        self.ensure_alive()?;
        self.state.params_url_str = value.into();
        tracing::trace!(params = %self.state.params_url_str, "Parameters updated");
        Ok(())
    }

    /// Wait for the next completion and apply it.
    ///
    /// Returns `None` once the session is torn down.
    pub async fn handle_next(&mut self) -> Option<Completion> {
        if self.torn_down {
            return None;
        }
        let outcome = self.rx.recv().await?;
        Some(self.apply(outcome))
    }

    /// Apply every completion that is already available without waiting.
    ///
    /// Returns the number applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while !self.torn_down {
            match self.rx.try_recv() {
                Ok(outcome) => {
                    self.apply(outcome);
                    applied += 1;
                }
                Err(_) => break,
            }
        }
        applied
    }

    /// Apply completions until no backend call is outstanding.
    pub async fn run_until_idle(&mut self) {
        while self.state.busy {
            if self.handle_next().await.is_none() {
                break;
            }
        }
    }

    /// Stop the poll timer and ignore all further completions.
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(timer) = self.poll_timer.take() {
            drop(timer);
            tracing::debug!("Poll timer released");
        }
        self.rx.close();

        if let Some(op) = self.in_flight {
            tracing::debug!("Abandoning in-flight {} call", op);
        }
        tracing::info!("Visualization session torn down");
    }

    /// Current session data.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Derived lifecycle state.
    #[must_use]
    pub fn vis_state(&self) -> VisState {
        self.state.vis_state()
    }

    /// Returns true while a backend call is outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.state.busy
    }

    /// Operation currently awaiting completion.
    #[must_use]
    pub fn in_flight(&self) -> Option<Operation> {
        self.in_flight
    }

    /// Returns true between mount and teardown.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.runtime.is_some() && !self.torn_down
    }

    /// Returns true while the poll timer is held.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.poll_timer.is_some()
    }

    /// Returns true once torn down.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Number of requests supplied at construction.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.request_count
    }

    /// Backend query string for the current values.
    #[must_use]
    pub fn query(&self) -> String {
        self.state.query()
    }

    /// Proxy URL for the current instance, or `None` without one.
    ///
    /// Fails with [`VisError::Address`] when the address carries no
    /// `/flexy-vis/<id>/` segment.
    pub fn open_url(&self) -> VisResult<Option<String>> {
        if self.state.pod_address.is_empty() {
            return Ok(None);
        }
        let url = make_proxy_url(&self.state.pod_address, &self.config.base_domain)?;
        Ok(Some(url))
    }

    /// Affordances for the presentation layer.
    #[must_use]
    pub fn view(&self) -> SessionView {
        let state = self.vis_state();
        let busy = self.state.busy;
        let (open_url, address_error) = match self.open_url() {
            Ok(url) => (url, None),
            Err(e) => (None, Some(e.to_string())),
        };

        SessionView {
            state,
            busy,
            can_start: self.is_mounted() && !busy && !state.has_instance(),
            can_open: !busy && open_url.is_some(),
            can_delete: self.is_mounted() && !busy && state.has_instance(),
            starting_notice: state == VisState::InstanceStarting,
            open_url,
            address_error,
            error_message: self.state.error_message.clone(),
            delete_dialog_open: self.state.delete_dialog_open,
            params_url_str: self.state.params_url_str.clone(),
            start_label: if self.request_count > 1 {
                "Start Combined Visualisation"
            } else {
                "Start Visualisation"
            },
        }
    }

    /// Viewer display name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        DISPLAY_NAME
    }

    /// Whether several requests can share one viewer.
    #[must_use]
    pub fn is_aggregatable(&self) -> bool {
        AGGREGATABLE
    }

    fn ensure_alive(&self) -> VisResult<()> {
        if self.torn_down {
            return Err(VisError::TornDown);
        }
        Ok(())
    }

    fn ensure_idle(&self) -> VisResult<()> {
        self.ensure_alive()?;
        if self.runtime.is_none() {
            return Err(VisError::NotMounted);
        }
        if self.state.busy {
            return Err(VisError::Busy);
        }
        Ok(())
    }

    /// Mark busy and spawn the backend call for `op`.
    fn begin(&mut self, op: Operation) -> VisResult<()> {
        let runtime = self.runtime.as_ref().ok_or(VisError::NotMounted)?;
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        let query = self.state.query();

        self.state.busy = true;
        self.in_flight = Some(op);
        tracing::debug!(%op, %query, "Backend call started");

        runtime.spawn(async move {
            let outcome = match op {
                Operation::Existence => {
                    Outcome::Existence(backend.get_app(&query).await.map_err(describe))
                }
                Operation::Start => {
                    Outcome::Started(backend.start_app(&query).await.map_err(describe))
                }
                Operation::Delete => {
                    Outcome::Deleted(backend.delete_app(&query).await.map_err(describe))
                }
            };
            // Fails only after teardown, when nobody is listening
            let _ = tx.send(outcome).await;
        });
        Ok(())
    }

    fn finish(&mut self) {
        self.state.busy = false;
        self.in_flight = None;
    }

    fn record_failure(&mut self, op: Operation, message: String) {
        tracing::warn!("Visualization {} failed: {}", op, message);
        self.state.error_message = Some(message);
    }

    fn apply(&mut self, outcome: Outcome) -> Completion {
        match outcome {
            Outcome::Existence(result) => {
                self.finish();
                match result {
                    Ok(info) if info.exists() => {
                        if info.pod_address != self.state.pod_address {
                            self.state.vis_ready = false;
                        }
                        tracing::info!(pod_address = %info.pod_address, "Visualization instance found");
                        self.state.pod_address = info.pod_address;
                    }
                    Ok(_) => tracing::debug!("No visualization instance"),
                    Err(message) => self.record_failure(Operation::Existence, message),
                }
                Completion::Existence
            }
            Outcome::Started(result) => {
                match result {
                    Ok(()) => {
                        tracing::info!("Visualization start accepted, looking up instance");
                        self.state.vis_ready = false;
                        if let Err(e) = self.begin(Operation::Existence) {
                            self.finish();
                            self.record_failure(Operation::Existence, e.to_string());
                        }
                    }
                    Err(message) => {
                        self.finish();
                        self.record_failure(Operation::Start, message);
                    }
                }
                Completion::Start
            }
            Outcome::Deleted(result) => {
                self.finish();
                match result {
                    Ok(()) => {
                        tracing::info!("Visualization deleted");
                        self.state.pod_address.clear();
                        self.state.vis_ready = false;
                        self.state.delete_dialog_open = false;
                    }
                    Err(message) => self.record_failure(Operation::Delete, message),
                }
                Completion::Delete
            }
            Outcome::Tick => {
                self.on_tick();
                Completion::Tick
            }
            Outcome::Readiness {
                pod_address,
                result,
            } => {
                self.probe_in_flight = false;
                match result {
                    Ok(true) if !pod_address.is_empty() && pod_address == self.state.pod_address => {
                        tracing::info!(%pod_address, "Visualization ready");
                        self.state.vis_ready = true;
                    }
                    Ok(_) => tracing::trace!(%pod_address, "Visualization not ready yet"),
                    Err(message) => {
                        tracing::debug!(%pod_address, "Readiness probe failed, retrying next tick: {}", message);
                    }
                }
                Completion::Readiness
            }
        }
    }

    fn on_tick(&mut self) {
        if !matches!(self.vis_state(), VisState::InstanceStarting) || self.probe_in_flight {
            return;
        }
        let url = match make_proxy_url(&self.state.pod_address, &self.config.base_domain) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Skipping readiness probe: {}", e);
                return;
            }
        };
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };

        let probe = Arc::clone(&self.probe);
        let tx = self.tx.clone();
        let pod_address = self.state.pod_address.clone();
        self.probe_in_flight = true;

        runtime.spawn(async move {
            let result = probe.is_ready(&url).await.map_err(describe);
            let _ = tx
                .send(Outcome::Readiness {
                    pod_address,
                    result,
                })
                .await;
        });
    }
}

impl Drop for VisSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn describe(err: anyhow::Error) -> String {
    let message = err.to_string();
    if message.trim().is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        message
    }
}
