//! Daemon-related errors.

use std::path::PathBuf;

use thiserror::Error;
use vigil_config::ConfigError;

use crate::state::{IllegalTransition, InvalidStateError};

/// Errors that can occur while running a daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// PID file already exists and the recorded process is alive.
    #[error("Daemon already running (PID file: {path}, PID: {pid})")]
    AlreadyRunning { path: PathBuf, pid: u32 },

    /// Failed to create PID file.
    #[error("Failed to create PID file at {path}: {reason}")]
    PidFileCreation { path: PathBuf, reason: String },

    /// Failed to read PID file.
    #[error("Failed to read PID file at {path}: {reason}")]
    PidFileRead { path: PathBuf, reason: String },

    /// Failed to remove PID file.
    #[error("Failed to remove PID file at {path}: {reason}")]
    PidFileRemoval { path: PathBuf, reason: String },

    /// Process fork failed.
    #[error("Failed to fork process: {0}")]
    ForkFailed(String),

    /// Switching user or group failed.
    #[error("Failed to drop privileges: {0}")]
    PrivilegeDrop(String),

    /// Failed to set up signal handlers.
    #[error("Failed to set up signal handlers: {0}")]
    SignalSetup(String),

    /// No live process behind the PID file.
    #[error("Daemon is not running")]
    NotRunning,

    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    /// The application's `setup()` hook failed.
    #[error("Application setup failed: {0}")]
    Setup(String),

    /// The application's `process()` hook failed.
    #[error("Application process failed: {0}")]
    Process(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Logging could not be initialised or reconfigured.
    #[error("Logging error: {0}")]
    Logging(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic daemon error.
    #[error("{0}")]
    Custom(String),
}
