//! Integration tests for the visualization session lifecycle.
//!
//! All tests run against `MockBackend`/`MockProbe`. Timer-driven tests use a
//! paused tokio clock so poll ticks fire as soon as the runtime is idle.

use flexy_vis::backend::mock::{MockCall, MockProbe};
use flexy_vis::{
    Completion, MockBackend, SessionConfig, VisError, VisSession, VisState, VisualizationRequest,
};
use std::sync::Arc;
use std::time::Duration;

const ADDRESS: &str = "foo.svc.cluster.local:6006/flexy-vis/abc-123/";
const BASE_DOMAIN: &str = "http://ambassador.ingress.dev.grabds.com";

/// Helper to build a request with a couple of parameters.
fn request() -> VisualizationRequest {
    VisualizationRequest::new("https://git.example.com/vis.git", "app/main.py", "kubeflow")
        .with_param("run", "run 42")
        .with_param("days", "7")
}

fn config(poll_ms: u64) -> SessionConfig {
    SessionConfig::default()
        .with_poll_interval(Duration::from_millis(poll_ms))
        .with_base_domain(BASE_DOMAIN)
}

/// Mounted session with a long poll interval so ticks stay out of the way.
async fn mounted(backend: Arc<MockBackend>, probe: Arc<MockProbe>) -> VisSession {
    let mut session = VisSession::new(vec![request()], backend, probe, config(60_000))
        .expect("Failed to create session");
    session.mount().expect("Failed to mount");
    session.run_until_idle().await;
    session
}

#[tokio::test]
async fn test_mount_without_instance() {
    let backend = Arc::new(MockBackend::new(ADDRESS));
    let session = mounted(backend.clone(), Arc::new(MockProbe::new())).await;

    assert_eq!(session.vis_state(), VisState::NoInstance);
    assert!(!session.is_busy());
    assert!(session.is_polling());
    assert_eq!(backend.call_count(MockCall::Get).await, 1);

    let view = session.view();
    assert!(view.can_start);
    assert!(!view.can_open);
    assert!(!view.can_delete);
    assert_eq!(view.start_label, "Start Visualisation");
}

#[tokio::test]
async fn test_mount_finds_existing_instance() {
    let backend = Arc::new(MockBackend::with_instance(ADDRESS));
    let session = mounted(backend, Arc::new(MockProbe::new())).await;

    assert_eq!(session.vis_state(), VisState::InstanceStarting);
    assert_eq!(session.state().pod_address, ADDRESS);
    assert!(!session.state().vis_ready);

    let view = session.view();
    assert!(!view.can_start);
    assert!(view.can_open);
    assert!(view.can_delete);
    assert!(view.starting_notice);
    assert_eq!(
        view.open_url.as_deref(),
        Some("http://ambassador.ingress.dev.grabds.com/flexy-vis/abc-123/")
    );
}

#[tokio::test]
async fn test_mount_failure_records_error() {
    let backend = Arc::new(MockBackend::new(ADDRESS));
    backend.fail_next(MockCall::Get, "namespace not found").await;
    let session = mounted(backend, Arc::new(MockProbe::new())).await;

    assert_eq!(session.vis_state(), VisState::NoInstance);
    assert!(!session.is_busy());
    assert_eq!(
        session.state().error_message.as_deref(),
        Some("namespace not found")
    );
}

#[tokio::test]
async fn test_mount_twice_rejected() {
    let mut session = mounted(Arc::new(MockBackend::new(ADDRESS)), Arc::new(MockProbe::new())).await;
    assert!(matches!(session.mount(), Err(VisError::AlreadyMounted)));
}

#[tokio::test]
async fn test_backend_receives_encoded_query() {
    let backend = Arc::new(MockBackend::new(ADDRESS));
    let _session = mounted(backend.clone(), Arc::new(MockProbe::new())).await;

    let queries = backend.queries().await;
    assert_eq!(
        queries,
        vec![
            "source=https%3A%2F%2Fgit.example.com%2Fvis.git&entrypoint=app%2Fmain.py&namespace=kubeflow&days=7&run=run%2042"
                .to_string()
        ]
    );
}

#[tokio::test]
async fn test_start_transitions_to_starting() {
    let backend = Arc::new(MockBackend::new(ADDRESS));
    let mut session = mounted(backend.clone(), Arc::new(MockProbe::new())).await;

    session.start().expect("start should be accepted");
    assert!(session.is_busy());

    assert_eq!(session.handle_next().await, Some(Completion::Start));
    // Lookup re-issued immediately; still busy until it completes
    assert!(session.is_busy());
    assert_eq!(session.handle_next().await, Some(Completion::Existence));

    assert!(!session.is_busy());
    assert_eq!(session.vis_state(), VisState::InstanceStarting);
    assert_eq!(session.state().pod_address, ADDRESS);
    assert!(!session.state().vis_ready);
    assert_eq!(backend.call_count(MockCall::Get).await, 2);
}

#[tokio::test]
async fn test_start_failure_stays_without_instance() {
    let backend = Arc::new(MockBackend::new(ADDRESS));
    let mut session = mounted(backend.clone(), Arc::new(MockProbe::new())).await;
    backend.fail_next(MockCall::Start, "quota exceeded").await;

    session.start().unwrap();
    session.run_until_idle().await;

    assert_eq!(session.vis_state(), VisState::NoInstance);
    assert!(!session.is_busy());
    assert_eq!(session.state().error_message.as_deref(), Some("quota exceeded"));
    // No follow-up lookup after a failed start
    assert_eq!(backend.call_count(MockCall::Get).await, 1);
}

#[tokio::test]
async fn test_error_cleared_on_next_attempt() {
    let backend = Arc::new(MockBackend::new(ADDRESS));
    let mut session = mounted(backend.clone(), Arc::new(MockProbe::new())).await;
    backend.fail_next(MockCall::Start, "quota exceeded").await;

    session.start().unwrap();
    session.run_until_idle().await;
    assert!(session.state().error_message.is_some());

    session.start().unwrap();
    assert!(session.state().error_message.is_none());
    session.run_until_idle().await;
    assert!(session.state().error_message.is_none());
    assert_eq!(session.vis_state(), VisState::InstanceStarting);
}

#[tokio::test]
async fn test_start_rejected_with_instance() {
    let mut session = mounted(
        Arc::new(MockBackend::with_instance(ADDRESS)),
        Arc::new(MockProbe::new()),
    )
    .await;

    let err = session.start().unwrap_err();
    assert!(matches!(err, VisError::InvalidTransition { action: "start", .. }));
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_busy_blocks_user_actions() {
    let backend = Arc::new(MockBackend::new(ADDRESS));
    let mut session = mounted(backend.clone(), Arc::new(MockProbe::new())).await;

    backend.pause().await;
    session.start().unwrap();
    tokio::task::yield_now().await;

    assert!(session.is_busy());
    assert!(matches!(session.start(), Err(VisError::Busy)));
    assert!(matches!(session.refresh(), Err(VisError::Busy)));
    assert!(matches!(session.delete(), Err(VisError::Busy)));
    assert!(!session.view().can_start);
    assert_eq!(backend.call_count(MockCall::Start).await, 1);

    backend.resume().await;
    session.run_until_idle().await;
    assert!(!session.is_busy());
    assert_eq!(session.vis_state(), VisState::InstanceStarting);
    assert_eq!(backend.call_count(MockCall::Start).await, 1);
}

#[tokio::test]
async fn test_delete_requires_confirmation() {
    let backend = Arc::new(MockBackend::with_instance(ADDRESS));
    let mut session = mounted(backend.clone(), Arc::new(MockProbe::new())).await;

    assert!(matches!(session.delete(), Err(VisError::DeleteNotConfirmed)));
    assert_eq!(backend.call_count(MockCall::Delete).await, 0);

    session.open_delete_dialog().unwrap();
    session.close_delete_dialog().unwrap();
    assert!(matches!(session.delete(), Err(VisError::DeleteNotConfirmed)));
}

#[tokio::test]
async fn test_delete_without_instance_rejected() {
    let mut session = mounted(Arc::new(MockBackend::new(ADDRESS)), Arc::new(MockProbe::new())).await;
    session.open_delete_dialog().unwrap();
    assert!(matches!(
        session.delete(),
        Err(VisError::InvalidTransition { action: "delete", .. })
    ));
}

#[tokio::test]
async fn test_delete_resets_to_no_instance() {
    let backend = Arc::new(MockBackend::with_instance(ADDRESS));
    let mut session = mounted(backend.clone(), Arc::new(MockProbe::new())).await;

    session.open_delete_dialog().unwrap();
    assert!(session.view().delete_dialog_open);
    session.delete().unwrap();
    assert!(session.is_busy());

    assert_eq!(session.handle_next().await, Some(Completion::Delete));
    assert!(!session.is_busy());
    assert_eq!(session.vis_state(), VisState::NoInstance);
    assert!(session.state().pod_address.is_empty());
    assert!(!session.state().vis_ready);
    assert!(!session.state().delete_dialog_open);
    assert_eq!(backend.pod_address().await, "");
}

#[tokio::test]
async fn test_delete_failure_keeps_instance() {
    let backend = Arc::new(MockBackend::with_instance(ADDRESS));
    let mut session = mounted(backend.clone(), Arc::new(MockProbe::new())).await;
    backend.fail_next(MockCall::Delete, "forbidden").await;

    session.open_delete_dialog().unwrap();
    session.delete().unwrap();
    session.run_until_idle().await;

    assert_eq!(session.vis_state(), VisState::InstanceStarting);
    assert_eq!(session.state().pod_address, ADDRESS);
    assert_eq!(session.state().error_message.as_deref(), Some("forbidden"));
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_edited_params_used_verbatim() {
    let backend = Arc::new(MockBackend::new(ADDRESS));
    let mut session = mounted(backend.clone(), Arc::new(MockProbe::new())).await;

    session.set_params_url("days=30&raw=a b").unwrap();
    session.start().unwrap();
    session.run_until_idle().await;

    let queries = backend.queries().await;
    assert!(queries[1].ends_with("&namespace=kubeflow&days=30&raw=a b"));
    assert_eq!(session.view().params_url_str, "days=30&raw=a b");
}

#[tokio::test]
async fn test_invalid_address_surfaces_in_view() {
    let backend = Arc::new(MockBackend::with_instance("svc:6006/tensorboard/abc/"));
    let session = mounted(backend, Arc::new(MockProbe::new())).await;

    let view = session.view();
    assert_eq!(view.state, VisState::InstanceStarting);
    assert!(!view.can_open);
    assert!(view.open_url.is_none());
    assert!(view.address_error.unwrap().contains("Invalid podAddress format"));
    assert!(matches!(session.open_url(), Err(VisError::Address(_))));
}

#[tokio::test(start_paused = true)]
async fn test_poll_marks_instance_ready() {
    let backend = Arc::new(MockBackend::with_instance(ADDRESS));
    let probe = Arc::new(MockProbe::new());
    probe.set_ready(true);

    let mut session = VisSession::new(vec![request()], backend, probe.clone(), config(5000)).unwrap();
    session.mount().unwrap();
    session.run_until_idle().await;
    assert_eq!(session.vis_state(), VisState::InstanceStarting);

    assert_eq!(session.handle_next().await, Some(Completion::Tick));
    assert_eq!(session.handle_next().await, Some(Completion::Readiness));

    assert_eq!(session.vis_state(), VisState::InstanceReady);
    assert_eq!(probe.calls(), 1);
    assert_eq!(
        probe.last_url().await.as_deref(),
        Some("http://ambassador.ingress.dev.grabds.com/flexy-vis/abc-123/")
    );
    assert!(!session.view().starting_notice);

    // Ready: further ticks do not probe
    assert_eq!(session.handle_next().await, Some(Completion::Tick));
    assert_eq!(session.handle_next().await, Some(Completion::Tick));
    assert_eq!(probe.calls(), 1);
    assert_eq!(session.vis_state(), VisState::InstanceReady);
}

#[tokio::test(start_paused = true)]
async fn test_poll_is_noop_without_instance() {
    let probe = Arc::new(MockProbe::new());
    let mut session = VisSession::new(
        vec![request()],
        Arc::new(MockBackend::new(ADDRESS)),
        probe.clone(),
        config(1000),
    )
    .unwrap();
    session.mount().unwrap();
    session.run_until_idle().await;

    assert_eq!(session.handle_next().await, Some(Completion::Tick));
    assert_eq!(session.handle_next().await, Some(Completion::Tick));
    assert_eq!(probe.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_poll_retries_until_ready() {
    let probe = Arc::new(MockProbe::new());
    let mut session = VisSession::new(
        vec![request()],
        Arc::new(MockBackend::with_instance(ADDRESS)),
        probe.clone(),
        config(1000),
    )
    .unwrap();
    session.mount().unwrap();
    session.run_until_idle().await;

    // Not ready, then failing: neither surfaces to the user
    while session.handle_next().await != Some(Completion::Readiness) {}
    probe.set_failing(true);
    while session.handle_next().await != Some(Completion::Readiness) {}
    assert_eq!(session.vis_state(), VisState::InstanceStarting);
    assert!(session.state().error_message.is_none());

    probe.set_failing(false);
    probe.set_ready(true);
    while session.handle_next().await != Some(Completion::Readiness) {}
    assert_eq!(session.vis_state(), VisState::InstanceReady);
    assert_eq!(probe.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_poll_runs_while_busy() {
    let backend = Arc::new(MockBackend::with_instance(ADDRESS));
    let probe = Arc::new(MockProbe::new());
    probe.set_ready(true);
    let mut session = VisSession::new(vec![request()], backend.clone(), probe.clone(), config(1000))
        .unwrap();
    session.mount().unwrap();
    session.run_until_idle().await;

    backend.pause().await;
    session.refresh().unwrap();
    assert!(session.is_busy());

    assert_eq!(session.handle_next().await, Some(Completion::Tick));
    assert_eq!(session.handle_next().await, Some(Completion::Readiness));
    assert_eq!(session.vis_state(), VisState::InstanceReady);
    assert!(session.is_busy());

    backend.resume().await;
    session.run_until_idle().await;
    // Same address: readiness survives the lookup
    assert_eq!(session.vis_state(), VisState::InstanceReady);
}

#[tokio::test(start_paused = true)]
async fn test_lookup_with_new_address_resets_readiness() {
    let backend = Arc::new(MockBackend::with_instance(ADDRESS));
    let probe = Arc::new(MockProbe::new());
    probe.set_ready(true);
    let mut session = VisSession::new(vec![request()], backend.clone(), probe.clone(), config(1000))
        .unwrap();
    session.mount().unwrap();
    session.run_until_idle().await;
    while session.handle_next().await != Some(Completion::Readiness) {}
    assert_eq!(session.vis_state(), VisState::InstanceReady);

    let replacement = "bar.svc.cluster.local:6006/flexy-vis/def-456/";
    backend.replace_instance(replacement).await;
    probe.set_ready(false);
    session.refresh().unwrap();
    session.run_until_idle().await;

    assert_eq!(session.vis_state(), VisState::InstanceStarting);
    assert_eq!(session.state().pod_address, replacement);
    assert!(!session.state().vis_ready);
    assert_eq!(
        session.view().open_url.as_deref(),
        Some("http://ambassador.ingress.dev.grabds.com/flexy-vis/def-456/")
    );
}

#[tokio::test]
async fn test_late_completion_after_teardown_is_ignored() {
    let backend = Arc::new(MockBackend::new(ADDRESS));
    let mut session = mounted(backend.clone(), Arc::new(MockProbe::new())).await;

    backend.pause().await;
    session.start().unwrap();
    tokio::task::yield_now().await;
    let before = session.state().clone();

    session.teardown();
    assert!(!session.is_polling());
    backend.resume().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Backend finished the call, but the session did not move
    assert_eq!(backend.pod_address().await, ADDRESS);
    assert_eq!(session.handle_next().await, None);
    assert_eq!(session.process_pending(), 0);
    assert_eq!(session.state(), &before);
}

#[tokio::test]
async fn test_teardown_is_idempotent() {
    let mut session = mounted(Arc::new(MockBackend::new(ADDRESS)), Arc::new(MockProbe::new())).await;

    session.teardown();
    session.teardown();

    assert!(session.is_torn_down());
    assert!(!session.is_mounted());
    assert!(matches!(session.start(), Err(VisError::TornDown)));
    assert!(matches!(session.open_delete_dialog(), Err(VisError::TornDown)));
    assert!(matches!(session.mount(), Err(VisError::TornDown)));
    assert!(!session.view().can_start);
}

#[tokio::test]
async fn test_process_pending_applies_ready_completions() {
    let backend = Arc::new(MockBackend::with_instance(ADDRESS));
    let mut session =
        VisSession::new(vec![request()], backend, Arc::new(MockProbe::new()), config(60_000)).unwrap();
    session.mount().unwrap();
    assert!(session.is_busy());

    // Let the lookup task run to completion
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(session.process_pending(), 1);
    assert!(!session.is_busy());
    assert_eq!(session.vis_state(), VisState::InstanceStarting);
    assert_eq!(session.process_pending(), 0);
}
