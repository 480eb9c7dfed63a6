//! Demonstration application run by the `vigil` binary.

use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use vigil_daemon::{Application, Context, HookResult};

/// Logs a heartbeat on every wake-up.
///
/// `application.message` in the configuration replaces the default text.
#[derive(Debug, Default)]
pub(crate) struct Heartbeat {
    cycles: u64,
    started: Option<Instant>,
}

impl Heartbeat {
    fn message(ctx: &Context) -> String {
        ctx.config()
            .application
            .get("message")
            .and_then(|value| value.as_str())
            .unwrap_or("still here")
            .to_string()
    }
}

#[async_trait]
impl Application for Heartbeat {
    async fn setup(&mut self, ctx: &Context) -> HookResult {
        self.started = Some(Instant::now());
        info!(wake_interval = ?ctx.wake_interval(), "Heartbeat ready");
        Ok(())
    }

    async fn process(&mut self, ctx: &Context) -> HookResult {
        self.cycles += 1;
        info!(cycle = self.cycles, "{}", Self::message(ctx));
        Ok(())
    }

    async fn cleanup(&mut self, _ctx: &Context) -> HookResult {
        let uptime = self.started.map(|s| s.elapsed()).unwrap_or_default();
        info!(cycles = self.cycles, ?uptime, "Heartbeat done");
        Ok(())
    }

    async fn on_config_reloaded(&mut self, ctx: &Context) -> HookResult {
        info!(wake_interval = ?ctx.wake_interval(), "Heartbeat picked up new configuration");
        Ok(())
    }

    async fn on_user_signal1(&mut self, ctx: &Context) -> HookResult {
        info!(cycles = self.cycles, state = %ctx.state(), "User signal 1");
        Ok(())
    }

    async fn on_user_signal2(&mut self, _ctx: &Context) -> HookResult {
        info!("User signal 2, resetting cycle counter");
        self.cycles = 0;
        Ok(())
    }
}
