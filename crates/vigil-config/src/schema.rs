//! Configuration snapshot definitions.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest wake interval the runtime will honour, in seconds.
pub const MIN_WAKE_INTERVAL_SECS: u64 = 1;

/// Default wake interval, in seconds.
pub const DEFAULT_WAKE_INTERVAL_SECS: u64 = 60;

/// An immutable configuration value.
///
/// Snapshots are never mutated in place by the runtime: a reload produces a
/// new snapshot which replaces the previous one as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    #[serde(default, alias = "Application")]
    pub application: ApplicationSettings,

    #[serde(default, alias = "Daemon")]
    pub daemon: DaemonSettings,

    #[serde(default, alias = "Logging")]
    pub logging: LoggingSettings,
}

impl ConfigSnapshot {
    /// Interval between two `process()` invocations.
    pub fn wake_interval(&self) -> Duration {
        self.application.wake_interval()
    }
}

/// Application section.
///
/// Only the wake interval is interpreted by the runtime. Every other key is
/// kept verbatim for the embedding application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Seconds between wake-ups.
    #[serde(rename = "wake_interval", default = "default_wake_interval")]
    pub wake_interval_secs: u64,

    /// Application-defined settings.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_wake_interval() -> u64 {
    DEFAULT_WAKE_INTERVAL_SECS
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            wake_interval_secs: default_wake_interval(),
            extra: BTreeMap::new(),
        }
    }
}

impl ApplicationSettings {
    /// Wake interval as a Duration, clamped to the one second minimum.
    pub fn wake_interval(&self) -> Duration {
        Duration::from_secs(self.wake_interval_secs.max(MIN_WAKE_INTERVAL_SECS))
    }

    /// Look up an application-defined value.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }
}

/// Daemon section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// User to run as after daemonizing.
    #[serde(default)]
    pub user: Option<String>,

    /// Group to run as after daemonizing.
    #[serde(default)]
    pub group: Option<String>,

    /// Path of the pid marker file.
    #[serde(default)]
    pub pidfile: Option<PathBuf>,

    /// Disable core dumps for the daemonized process.
    #[serde(default = "default_prevent_core")]
    pub prevent_core: bool,

    /// How often shutdown rechecks a draining unit of work (in milliseconds).
    #[serde(default = "default_drain_poll_interval")]
    pub drain_poll_interval_ms: u64,

    /// Raise on illegal state transitions instead of ignoring them.
    #[serde(default)]
    pub strict_transitions: bool,
}

fn default_prevent_core() -> bool {
    true
}

fn default_drain_poll_interval() -> u64 {
    500
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            user: None,
            group: None,
            pidfile: None,
            prevent_core: default_prevent_core(),
            drain_poll_interval_ms: default_drain_poll_interval(),
            strict_transitions: false,
        }
    }
}

impl DaemonSettings {
    /// Drain poll interval as a Duration.
    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms.max(1))
    }
}

/// Logging section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Root level (`trace`, `debug`, `info`, `warn`, `error` or `off`).
    #[serde(default = "default_level")]
    pub level: String,

    /// Per-target level overrides, e.g. `vigil_daemon = "debug"`.
    #[serde(default)]
    pub targets: BTreeMap<String, String>,

    #[serde(default)]
    pub console: ConsoleSettings,

    #[serde(default)]
    pub file: Option<FileSettings>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            targets: BTreeMap::new(),
            console: ConsoleSettings::default(),
            file: None,
        }
    }
}

impl LoggingSettings {
    /// Render the levels as `EnvFilter` directives.
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.level.trim().to_lowercase()];
        for (target, level) in &self.targets {
            directives.push(format!("{}={}", target, level.trim().to_lowercase()));
        }
        directives.join(",")
    }

    /// Whether two settings differ only in their levels.
    ///
    /// Level changes can be applied to a running subscriber, sink changes
    /// cannot.
    pub fn same_sinks(&self, other: &LoggingSettings) -> bool {
        self.console == other.console && self.file == other.file
    }
}

/// Console (stderr) output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_console_enabled")]
    pub enabled: bool,

    /// Only attach the console when running in the foreground.
    #[serde(default = "default_debug_only")]
    pub debug_only: bool,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_console_enabled() -> bool {
    true
}

fn default_debug_only() -> bool {
    true
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: default_console_enabled(),
            debug_only: default_debug_only(),
            format: LogFormat::default(),
        }
    }
}

impl ConsoleSettings {
    /// Whether the console sink is attached in the given mode.
    pub fn is_attached(&self, foreground: bool) -> bool {
        self.enabled && (foreground || !self.debug_only)
    }
}

/// Rolling log file output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSettings {
    pub directory: PathBuf,

    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub rotation: Rotation,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_prefix() -> String {
    "vigil.log".to_string()
}

/// Line format of a log sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Json,
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Never,
    Hourly,
    #[default]
    Daily,
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
