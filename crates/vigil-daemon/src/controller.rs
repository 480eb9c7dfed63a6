//! The lifecycle controller.
//!
//! A [`Controller`] owns one [`Application`], the lifecycle state and the
//! event loop. [`Controller::start`] runs the whole lifecycle on the calling
//! task and returns once `Stopped` is reached:
//!
//! ```text
//! Initializing -> Active (setup) -> Sleeping <-> Active (process) ...
//!              -> StopRequested (drain) -> Stopping (cleanup) -> Stopped
//! ```
//!
//! A hook may park the controller in `Idle`: the loop keeps waking and
//! dispatching intents but skips `process()` until a hook moves it on.
//!
//! Everything that touches the state or the configuration runs on that one
//! task. Signals and [`ControllerHandle`]s only enqueue intents.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use vigil_config::{ConfigSnapshot, ConfigSource, StaticConfigSource};

use crate::application::Application;
use crate::error::DaemonError;
use crate::event_loop::{EventLoop, Wakeup};
use crate::logging::LoggingHandle;
use crate::pid::PidFile;
use crate::signal::{intent_channel, Intent, IntentSender, SignalBridge};
use crate::state::{
    IllegalTransition, LifecycleCell, LifecycleState, StateChange, Transition, TransitionPolicy,
};

/// What the application hooks can see of the controller.
#[derive(Debug, Clone)]
pub struct Context {
    state: Arc<LifecycleCell>,
    config: Arc<RwLock<Arc<ConfigSnapshot>>>,
    intents: IntentSender,
}

impl Context {
    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// Request a state change, subject to the transition table.
    pub fn set_state(&self, next: LifecycleState) -> Result<Transition, IllegalTransition> {
        self.state.set(next)
    }

    /// The current configuration snapshot.
    ///
    /// The returned snapshot never changes; a reload installs a new one.
    pub fn config(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.config.read())
    }

    pub fn wake_interval(&self) -> Duration {
        self.config().wake_interval()
    }

    /// Ask the controller to stop once the current hook returns.
    pub fn request_stop(&self) {
        self.intents.request_stop();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state.subscribe()
    }

    fn install(&self, snapshot: Arc<ConfigSnapshot>) {
        *self.config.write() = snapshot;
    }
}

/// Cloneable remote control for a running controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    ctx: Context,
}

impl ControllerHandle {
    pub fn state(&self) -> LifecycleState {
        self.ctx.state()
    }

    pub fn config(&self) -> Arc<ConfigSnapshot> {
        self.ctx.config()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.ctx.subscribe()
    }

    /// Enqueue a stop request without waiting for it.
    pub fn request_stop(&self) {
        self.ctx.request_stop();
    }

    /// Enqueue a configuration reload.
    pub fn reload_configuration(&self) {
        self.ctx.intents.request_reload();
    }

    /// Enqueue any intent, as if the matching signal had arrived.
    pub fn send(&self, intent: Intent) -> bool {
        self.ctx.intents.send(intent)
    }

    /// Request a stop and wait until the controller reaches `Stopped`.
    ///
    /// Polls every drain poll interval. Only returns once the controller's
    /// `start()` has run to completion, so it waits forever on a controller
    /// that was never started.
    pub async fn stop(&self) {
        self.request_stop();
        loop {
            match self.state() {
                LifecycleState::Stopped => return,
                LifecycleState::StopRequested => {
                    info!("Waiting for the in-flight unit of work to finish");
                }
                _ => {}
            }
            let poll = self.ctx.config().daemon.drain_poll_interval();
            tokio::time::sleep(poll).await;
        }
    }
}

enum Dispatch {
    Continue,
    Rearm,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReloadOutcome {
    /// A new snapshot was installed.
    Reloaded,
    /// The source returned the current configuration.
    Unchanged,
    /// Loading failed; the current snapshot was kept.
    Failed,
}

/// Builds a [`Controller`].
pub struct ControllerBuilder<A> {
    application: A,
    source: Option<Arc<dyn ConfigSource>>,
    logging: Option<Arc<LoggingHandle>>,
    install_signals: bool,
    policy: Option<TransitionPolicy>,
}

impl<A: Application> ControllerBuilder<A> {
    /// Where configuration comes from. Defaults to built-in defaults.
    pub fn config_source<S: ConfigSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn shared_config_source(mut self, source: Arc<dyn ConfigSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Logging handle to update on reload.
    pub fn logging(mut self, handle: Arc<LoggingHandle>) -> Self {
        self.logging = Some(handle);
        self
    }

    /// Whether `start()` installs the OS signal bridge (default: true).
    pub fn install_signals(mut self, install: bool) -> Self {
        self.install_signals = install;
        self
    }

    /// Override `daemon.strict_transitions`.
    pub fn transition_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Load the initial snapshot and build the controller.
    pub fn build(self) -> Result<Controller<A>, DaemonError> {
        let source = self
            .source
            .unwrap_or_else(|| Arc::new(StaticConfigSource::default()) as Arc<dyn ConfigSource>);
        let snapshot = source.load()?;
        info!(source = %source.describe(), "Configuration loaded");

        let policy = self
            .policy
            .unwrap_or_else(|| TransitionPolicy::from_strict(snapshot.daemon.strict_transitions));
        let pid_file = snapshot.daemon.pidfile.as_ref().map(PidFile::new);
        let (intents, intent_rx) = intent_channel();
        let event_loop = EventLoop::new(intent_rx, snapshot.daemon.drain_poll_interval());

        let ctx = Context {
            state: Arc::new(LifecycleCell::new(policy)),
            config: Arc::new(RwLock::new(Arc::new(snapshot))),
            intents,
        };

        Ok(Controller {
            application: self.application,
            ctx,
            source,
            event_loop,
            pid_file,
            logging: self.logging,
            install_signals: self.install_signals,
            policy_pinned: self.policy.is_some(),
        })
    }
}

/// Runs an [`Application`] through its lifecycle.
pub struct Controller<A> {
    application: A,
    ctx: Context,
    source: Arc<dyn ConfigSource>,
    event_loop: EventLoop,
    pid_file: Option<PidFile>,
    logging: Option<Arc<LoggingHandle>>,
    install_signals: bool,
    policy_pinned: bool,
}

impl<A: Application> Controller<A> {
    pub fn builder(application: A) -> ControllerBuilder<A> {
        ControllerBuilder {
            application,
            source: None,
            logging: None,
            install_signals: true,
            policy: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.ctx.state()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            ctx: self.ctx.clone(),
        }
    }

    /// Run the lifecycle to completion.
    ///
    /// Returns `Ok` after a graceful stop. A failing `setup()` or `process()`
    /// still ends in `Stopped` (without `cleanup()`), and its error is
    /// returned.
    pub async fn start(mut self) -> Result<(), DaemonError> {
        info!(source = %self.source.describe(), "Controller starting");

        let bridge = if self.install_signals {
            Some(SignalBridge::install(self.ctx.intents.clone())?)
        } else {
            None
        };

        if let Some(pid_file) = self.pid_file.as_mut() {
            if let Err(e) = pid_file.try_acquire() {
                error!("Cannot start: {}", e);
                self.abort();
                return Err(e);
            }
        }

        let result = self.run().await;

        drop(bridge);
        self.release_pid_file();
        result
    }

    async fn run(&mut self) -> Result<(), DaemonError> {
        self.transition(LifecycleState::Active, None);
        if let Err(e) = self.application.setup(&self.ctx).await {
            error!(error = %e, "setup() failed");
            self.abort();
            return Err(DaemonError::Setup(e.to_string()));
        }
        info!(wake_interval = ?self.ctx.wake_interval(), "Controller started");

        loop {
            let state = self.ctx.state();
            if state.is_stopped() {
                break;
            }
            if state.is_waiting_to_stop() || state.is_stopping() {
                self.shutdown(None).await;
                break;
            }

            if !self.sleep().await {
                break;
            }

            if self.ctx.state().is_idle() {
                debug!("Idle, skipping this wake-up");
                continue;
            }

            self.transition(LifecycleState::Active, None);
            let state = Arc::clone(&self.ctx.state);
            let driven = self
                .event_loop
                .drive(self.application.process(&self.ctx), || {
                    let _ =
                        state.set_with_intent(LifecycleState::StopRequested, Some(Intent::Stop));
                })
                .await;

            if let Err(e) = driven.output {
                error!(error = %e, "process() failed");
                self.abort();
                return Err(DaemonError::Process(e.to_string()));
            }

            if driven.stop_requested {
                self.shutdown(Some(Intent::Stop)).await;
                break;
            }
        }

        Ok(())
    }

    /// Sleep until the wake deadline, dispatching intents meanwhile.
    ///
    /// Returns false if the controller shut down instead. An `Idle` state
    /// is kept as is.
    async fn sleep(&mut self) -> bool {
        if !self.ctx.state().is_idle() {
            self.transition(LifecycleState::Sleeping, None);
        }
        self.event_loop.arm(self.ctx.wake_interval());

        loop {
            let intent = match self.event_loop.wait().await {
                Wakeup::Deadline => return true,
                Wakeup::Intent(intent) => intent,
            };

            match self.dispatch(intent).await {
                Dispatch::Continue => {}
                Dispatch::Rearm => {
                    self.event_loop.arm(self.ctx.wake_interval());
                }
                Dispatch::Shutdown => {
                    self.shutdown(Some(intent)).await;
                    return false;
                }
            }

            // A hook may have asked to stop.
            let state = self.ctx.state();
            if state.is_waiting_to_stop() || state.is_stopping() {
                self.shutdown(None).await;
                return false;
            }
        }
    }

    async fn dispatch(&mut self, intent: Intent) -> Dispatch {
        info!(intent = %intent, state = %self.ctx.state(), "Dispatching intent");

        match intent {
            Intent::Stop => Dispatch::Shutdown,
            Intent::Reload => {
                let outcome = self.reload_configuration().await;
                debug!(?outcome, "Reload handled");
                Dispatch::Rearm
            }
            Intent::UserSignal1 => {
                if let Err(e) = self.application.on_user_signal1(&self.ctx).await {
                    error!(error = %e, "on_user_signal1() failed");
                }
                Dispatch::Continue
            }
            Intent::UserSignal2 => {
                if let Err(e) = self.application.on_user_signal2(&self.ctx).await {
                    error!(error = %e, "on_user_signal2() failed");
                }
                Dispatch::Continue
            }
        }
    }

    /// Load a fresh snapshot and install it if it differs from the current one.
    async fn reload_configuration(&mut self) -> ReloadOutcome {
        let current = self.ctx.config();

        let fresh = match self.source.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(
                    error = %e,
                    source = %self.source.describe(),
                    "Configuration reload failed, keeping current configuration"
                );
                return ReloadOutcome::Failed;
            }
        };

        if !self.source.has_changed(&current, &fresh) {
            info!("Configuration unchanged");
            return ReloadOutcome::Unchanged;
        }

        if let Some(logging) = &self.logging {
            if let Err(e) = logging.check(&fresh.logging) {
                error!(error = %e, "Configuration reload failed, keeping current configuration");
                return ReloadOutcome::Failed;
            }
        }

        let fresh = Arc::new(fresh);
        self.ctx.install(Arc::clone(&fresh));

        self.event_loop
            .set_drain_poll_interval(fresh.daemon.drain_poll_interval());
        if !self.policy_pinned {
            self.ctx
                .state
                .set_policy(TransitionPolicy::from_strict(fresh.daemon.strict_transitions));
        }
        if fresh.daemon.pidfile != current.daemon.pidfile {
            warn!("Pid file changes take effect after a restart");
        }
        if let Some(logging) = &self.logging {
            if let Err(e) = logging.update(&fresh.logging) {
                warn!(error = %e, "Could not apply logging configuration");
            }
        }

        info!(wake_interval = ?fresh.wake_interval(), "Configuration reloaded");

        if let Err(e) = self.application.on_config_reloaded(&self.ctx).await {
            error!(error = %e, "on_config_reloaded() failed");
        }
        ReloadOutcome::Reloaded
    }

    /// The terminal path: `on_stop_requested()`, drain, `cleanup()`,
    /// `Stopped`. Safe to call twice.
    async fn shutdown(&mut self, trigger: Option<Intent>) {
        let state = self.ctx.state();
        if state.is_stopped() {
            debug!("Already stopped");
            return;
        }

        if !state.is_waiting_to_stop() && !state.is_stopping() {
            self.transition(LifecycleState::StopRequested, trigger);
        }
        if !state.is_stopping() {
            if let Err(e) = self.application.on_stop_requested(&self.ctx).await {
                error!(error = %e, "on_stop_requested() failed");
            }
        }

        self.event_loop.disarm();
        // Any unit of work was driven to completion before we got here.
        let dropped = self.event_loop.discard_pending();
        if dropped > 0 {
            debug!(dropped, "Discarded intents queued behind the stop request");
        }

        if !self.ctx.state().is_stopping() {
            self.transition(LifecycleState::Stopping, trigger);
        }

        if let Err(e) = self.application.cleanup(&self.ctx).await {
            error!(error = %e, "cleanup() failed");
        }

        self.transition(LifecycleState::Stopped, trigger);
        info!("Controller stopped");
    }

    /// Fatal path: straight to `Stopped`, skipping `cleanup()`.
    fn abort(&mut self) {
        self.event_loop.disarm();
        if !self.ctx.state().is_stopping() {
            self.transition(LifecycleState::Stopping, None);
        }
        self.transition(LifecycleState::Stopped, None);
    }

    fn transition(&self, next: LifecycleState, intent: Option<Intent>) {
        if let Err(e) = self.ctx.state.set_with_intent(next, intent) {
            error!(error = %e, "Controller transition refused");
        }
    }

    fn release_pid_file(&mut self) {
        if let Some(mut pid_file) = self.pid_file.take() {
            if let Err(e) = pid_file.release() {
                warn!("{}", e);
            }
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
