use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use vigil_config::ConfigError;

use crate::application::HookResult;

/// Source whose next result can be swapped by the test.
struct ScriptedSource {
    next: Mutex<Result<ConfigSnapshot, String>>,
}

impl ScriptedSource {
    fn new(snapshot: ConfigSnapshot) -> Arc<Self> {
        Arc::new(Self {
            next: Mutex::new(Ok(snapshot)),
        })
    }

    fn serve(&self, snapshot: ConfigSnapshot) {
        *self.next.lock() = Ok(snapshot);
    }

    fn fail(&self, message: &str) {
        *self.next.lock() = Err(message.to_string());
    }
}

impl ConfigSource for ScriptedSource {
    fn load(&self) -> Result<ConfigSnapshot, ConfigError> {
        self.next
            .lock()
            .clone()
            .map_err(ConfigError::InvalidFormat)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

#[derive(Default)]
struct Recorder {
    reloads: Arc<AtomicUsize>,
}

#[async_trait]
impl Application for Recorder {
    async fn process(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    async fn on_config_reloaded(&mut self, _ctx: &Context) -> HookResult {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn snapshot_with_interval(secs: u64) -> ConfigSnapshot {
    let mut snapshot = ConfigSnapshot::default();
    snapshot.application.wake_interval_secs = secs;
    snapshot
}

fn controller(source: &Arc<ScriptedSource>) -> (Controller<Recorder>, Arc<AtomicUsize>) {
    let app = Recorder::default();
    let reloads = Arc::clone(&app.reloads);
    let controller = Controller::builder(app)
        .shared_config_source(source.clone())
        .install_signals(false)
        .build()
        .unwrap();
    (controller, reloads)
}

#[test]
fn test_builder_defaults() {
    let controller = Controller::builder(Recorder::default()).build().unwrap();

    assert_eq!(controller.state(), LifecycleState::Initializing);
    assert_eq!(controller.context().config().application.wake_interval_secs, 60);
    assert_eq!(controller.context().wake_interval(), Duration::from_secs(60));
    assert!(controller.pid_file.is_none());
    assert_eq!(controller.ctx.state.policy(), TransitionPolicy::Lenient);
}

#[test]
fn test_builder_reads_daemon_settings() {
    let mut snapshot = ConfigSnapshot::default();
    snapshot.daemon.strict_transitions = true;
    snapshot.daemon.pidfile = Some("/tmp/vigil-builder.pid".into());
    snapshot.daemon.drain_poll_interval_ms = 20;
    let source = ScriptedSource::new(snapshot);

    let (controller, _) = controller(&source);

    assert_eq!(controller.ctx.state.policy(), TransitionPolicy::Strict);
    assert_eq!(
        controller.pid_file.as_ref().map(|p| p.path().to_path_buf()),
        Some("/tmp/vigil-builder.pid".into())
    );
    assert_eq!(
        controller.event_loop.drain_poll_interval(),
        Duration::from_millis(20)
    );
}

#[test]
fn test_build_fails_when_source_fails() {
    let source = ScriptedSource::new(ConfigSnapshot::default());
    source.fail("broken");

    let result = Controller::builder(Recorder::default())
        .shared_config_source(source)
        .build();
    assert!(matches!(result, Err(DaemonError::Config(_))));
}

#[tokio::test]
async fn test_failed_reload_keeps_everything() {
    let source = ScriptedSource::new(snapshot_with_interval(60));
    let (mut controller, reloads) = controller(&source);
    let before = controller.context().config();
    let state_before = controller.state();

    source.fail("unreadable");
    let outcome = controller.reload_configuration().await;

    assert_eq!(outcome, ReloadOutcome::Failed);
    let after = controller.context().config();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(*before, *after);
    assert_eq!(controller.state(), state_before);
    assert_eq!(controller.context().wake_interval(), Duration::from_secs(60));
    assert_eq!(reloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unchanged_reload_is_a_no_op() {
    let source = ScriptedSource::new(snapshot_with_interval(60));
    let (mut controller, reloads) = controller(&source);
    let before = controller.context().config();

    let outcome = controller.reload_configuration().await;

    assert_eq!(outcome, ReloadOutcome::Unchanged);
    assert!(Arc::ptr_eq(&before, &controller.context().config()));
    assert_eq!(reloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_reload_installs_new_snapshot() {
    let source = ScriptedSource::new(snapshot_with_interval(60));
    let (mut controller, reloads) = controller(&source);
    let old = controller.context().config();

    let mut fresh = snapshot_with_interval(5);
    fresh.daemon.strict_transitions = true;
    fresh.daemon.drain_poll_interval_ms = 50;
    source.serve(fresh.clone());

    let outcome = controller.reload_configuration().await;

    assert_eq!(outcome, ReloadOutcome::Reloaded);
    assert_eq!(*controller.context().config(), fresh);
    assert_eq!(controller.context().wake_interval(), Duration::from_secs(5));
    assert_eq!(controller.ctx.state.policy(), TransitionPolicy::Strict);
    assert_eq!(
        controller.event_loop.drain_poll_interval(),
        Duration::from_millis(50)
    );
    assert_eq!(reloads.load(Ordering::SeqCst), 1);
    // Readers holding the old snapshot still see it whole.
    assert_eq!(old.application.wake_interval_secs, 60);
}

#[tokio::test]
async fn test_pinned_policy_survives_reload() {
    let source = ScriptedSource::new(ConfigSnapshot::default());
    let mut controller = Controller::builder(Recorder::default())
        .shared_config_source(source.clone())
        .install_signals(false)
        .transition_policy(TransitionPolicy::Lenient)
        .build()
        .unwrap();

    let mut fresh = ConfigSnapshot::default();
    fresh.daemon.strict_transitions = true;
    source.serve(fresh);

    assert_eq!(
        controller.reload_configuration().await,
        ReloadOutcome::Reloaded
    );
    assert_eq!(controller.ctx.state.policy(), TransitionPolicy::Lenient);
}

#[test]
fn test_context_set_state_uses_table() {
    let (controller, _) = controller(&ScriptedSource::new(ConfigSnapshot::default()));
    let ctx = controller.context();

    assert!(ctx.set_state(LifecycleState::Idle).unwrap().is_changed());
    assert!(ctx.set_state(LifecycleState::Stopped).unwrap().is_rejected());
    assert_eq!(ctx.state(), LifecycleState::Idle);
}

#[tokio::test]
async fn test_handle_enqueues_intents() {
    let (mut controller, _) = controller(&ScriptedSource::new(ConfigSnapshot::default()));
    let handle = controller.handle();

    handle.reload_configuration();
    assert!(handle.send(Intent::UserSignal2));
    handle.request_stop();

    controller.event_loop.arm(Duration::from_secs(60));
    assert_eq!(controller.event_loop.wait().await, Wakeup::Intent(Intent::Reload));
    assert_eq!(
        controller.event_loop.wait().await,
        Wakeup::Intent(Intent::UserSignal2)
    );
    assert_eq!(controller.event_loop.wait().await, Wakeup::Intent(Intent::Stop));
}
