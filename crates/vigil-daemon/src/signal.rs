//! OS signal bridge.
//!
//! Signals are only ever turned into [`Intent`] values and pushed onto the
//! controller's intent queue. Everything else happens on the event loop.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::DaemonError;

/// Decoded meaning of a received signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Reload configuration (SIGHUP).
    Reload,
    /// Graceful shutdown (SIGTERM, SIGINT).
    Stop,
    /// Application-defined (SIGUSR1).
    UserSignal1,
    /// Application-defined (SIGUSR2).
    UserSignal2,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Reload => write!(f, "RELOAD"),
            Intent::Stop => write!(f, "STOP"),
            Intent::UserSignal1 => write!(f, "USER_SIGNAL_1"),
            Intent::UserSignal2 => write!(f, "USER_SIGNAL_2"),
        }
    }
}

/// Producer side of the intent queue.
#[derive(Debug, Clone)]
pub struct IntentSender {
    tx: mpsc::UnboundedSender<Intent>,
}

impl IntentSender {
    /// Enqueue an intent. Returns false once the event loop is gone.
    pub fn send(&self, intent: Intent) -> bool {
        self.tx.send(intent).is_ok()
    }

    pub fn request_stop(&self) -> bool {
        self.send(Intent::Stop)
    }

    pub fn request_reload(&self) -> bool {
        self.send(Intent::Reload)
    }

    /// Whether the consumer has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create an intent queue. The receiver belongs to the event loop.
pub fn intent_channel() -> (IntentSender, mpsc::UnboundedReceiver<Intent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (IntentSender { tx }, rx)
}

/// Relays OS signals onto an intent queue until dropped.
#[derive(Debug)]
pub struct SignalBridge {
    relay: JoinHandle<()>,
}

impl SignalBridge {
    /// Register handlers for SIGHUP, SIGTERM, SIGINT, SIGUSR1 and SIGUSR2.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn install(sender: IntentSender) -> Result<Self, DaemonError> {
        use tokio::signal::unix::{signal, SignalKind};

        let setup = |kind: SignalKind| {
            signal(kind).map_err(|e| DaemonError::SignalSetup(e.to_string()))
        };
        let mut hangup = setup(SignalKind::hangup())?;
        let mut terminate = setup(SignalKind::terminate())?;
        let mut interrupt = setup(SignalKind::interrupt())?;
        let mut user1 = setup(SignalKind::user_defined1())?;
        let mut user2 = setup(SignalKind::user_defined2())?;

        let relay = tokio::spawn(async move {
            loop {
                let intent = tokio::select! {
                    Some(()) = hangup.recv() => Intent::Reload,
                    Some(()) = terminate.recv() => Intent::Stop,
                    Some(()) = interrupt.recv() => Intent::Stop,
                    Some(()) = user1.recv() => Intent::UserSignal1,
                    Some(()) = user2.recv() => Intent::UserSignal2,
                    else => break,
                };
                if !sender.send(intent) {
                    break;
                }
            }
        });

        info!("OS signal handlers installed (SIGHUP, SIGTERM, SIGINT, SIGUSR1, SIGUSR2)");
        Ok(Self { relay })
    }

    /// Register a Ctrl+C handler, the only signal available off Unix.
    #[cfg(not(unix))]
    pub fn install(sender: IntentSender) -> Result<Self, DaemonError> {
        let relay = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !sender.request_stop() {
                    break;
                }
            }
        });

        info!("OS signal handlers installed (Ctrl+C only)");
        Ok(Self { relay })
    }

    /// Stop relaying signals.
    pub fn uninstall(self) {
        drop(self);
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        self.relay.abort();
        debug!("OS signal relay stopped");
    }
}

/// Deliver the OS signal mapped to `intent` to a running daemon process.
#[cfg(unix)]
pub fn send_signal_to_pid(pid: u32, intent: Intent) -> Result<(), DaemonError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let nix_signal = match intent {
        Intent::Stop => Signal::SIGTERM,
        Intent::Reload => Signal::SIGHUP,
        Intent::UserSignal1 => Signal::SIGUSR1,
        Intent::UserSignal2 => Signal::SIGUSR2,
    };

    kill(Pid::from_raw(pid as i32), nix_signal).map_err(|e| {
        DaemonError::Custom(format!("Failed to send {} to PID {}: {}", nix_signal, pid, e))
    })?;

    info!("Sent {} to PID {}", nix_signal, pid);
    Ok(())
}

#[cfg(not(unix))]
pub fn send_signal_to_pid(_pid: u32, _intent: Intent) -> Result<(), DaemonError> {
    Err(DaemonError::Custom(
        "Signal sending not supported on this platform".to_string(),
    ))
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
