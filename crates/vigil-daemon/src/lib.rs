//! # Vigil Daemon
//!
//! Lifecycle runtime for long-lived background processes.
//!
//! ## Features
//!
//! - Seven-state lifecycle with a single transition table
//! - OS signals (SIGHUP, SIGTERM/SIGINT, SIGUSR1/2) relayed as queued intents
//! - Periodic `process()` on a configurable wake interval, never overlapping
//! - Configuration hot-reload with atomic snapshot replacement
//! - Graceful shutdown that drains the in-flight unit of work
//! - PID file management and Unix daemonization
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vigil_daemon::{Application, Context, Controller, HookResult};
//!
//! struct Sweeper;
//!
//! #[async_trait::async_trait]
//! impl Application for Sweeper {
//!     async fn process(&mut self, ctx: &Context) -> HookResult {
//!         tracing::info!("sweeping every {:?}", ctx.wake_interval());
//!         Ok(())
//!     }
//! }
//!
//! let controller = Controller::builder(Sweeper)
//!     .config_source(vigil_config::FileConfigSource::new("vigil.yaml")?)
//!     .build()?;
//! controller.start().await?;
//! ```

pub mod application;
pub mod controller;
pub mod error;
pub mod event_loop;
pub mod logging;
pub mod pid;
pub mod signal;
pub mod state;

#[cfg(unix)]
pub mod daemonize;

// Re-exports
pub use application::{Application, HookError, HookResult};
pub use controller::{Context, Controller, ControllerBuilder, ControllerHandle};
pub use error::DaemonError;
pub use event_loop::{EventLoop, Wakeup};
pub use logging::LoggingHandle;
pub use pid::PidFile;
pub use signal::{Intent, IntentSender, SignalBridge};
pub use state::{
    IllegalTransition, InvalidStateError, LifecycleCell, LifecycleState, StateChange, Transition,
    TransitionPolicy,
};

#[cfg(unix)]
pub use daemonize::{Daemonizer, SupplementaryGroups};
