//! Application hooks driven by the controller.

use async_trait::async_trait;
use tracing::debug;

use crate::controller::Context;

/// Error returned by an application hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result of an application hook.
pub type HookResult = Result<(), HookError>;

/// The work a daemon does, plugged into a [`Controller`](crate::Controller).
///
/// Only [`process`](Application::process) is required. Failures of `setup`
/// and `process` are fatal; failures of every other hook are logged and the
/// loop carries on.
#[async_trait]
pub trait Application: Send + 'static {
    /// Called once, after the controller becomes active and before the
    /// first cycle.
    async fn setup(&mut self, _ctx: &Context) -> HookResult {
        debug!("No setup hook");
        Ok(())
    }

    /// One unit of work. Never called concurrently with itself.
    async fn process(&mut self, ctx: &Context) -> HookResult;

    /// Called once a stop has been requested, while the state is still
    /// `StopRequested`. Runs before [`cleanup`](Application::cleanup).
    async fn on_stop_requested(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    /// Called once during shutdown, after any in-flight unit of work.
    async fn cleanup(&mut self, _ctx: &Context) -> HookResult {
        debug!("No cleanup hook");
        Ok(())
    }

    /// Called after a changed configuration snapshot was installed.
    async fn on_config_reloaded(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    /// Called on SIGUSR1.
    async fn on_user_signal1(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }

    /// Called on SIGUSR2.
    async fn on_user_signal2(&mut self, _ctx: &Context) -> HookResult {
        Ok(())
    }
}
