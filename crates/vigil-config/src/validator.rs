//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::{ConfigSnapshot, MIN_WAKE_INTERVAL_SECS};

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a snapshot.
    pub fn validate(snapshot: &ConfigSnapshot) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_application(snapshot, &mut result);
        Self::validate_daemon(snapshot, &mut result);
        Self::validate_logging(snapshot, &mut result);

        Ok(result)
    }

    fn validate_application(snapshot: &ConfigSnapshot, result: &mut ValidationResult) {
        if snapshot.application.wake_interval_secs < MIN_WAKE_INTERVAL_SECS {
            result.add_warning(ValidationWarning::new(
                "application.wake_interval",
                format!(
                    "wake_interval must be at least {}, it will be clamped",
                    MIN_WAKE_INTERVAL_SECS
                ),
            ));
        }
    }

    fn validate_daemon(snapshot: &ConfigSnapshot, result: &mut ValidationResult) {
        let daemon = &snapshot.daemon;

        if daemon.drain_poll_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "daemon.drain_poll_interval_ms",
                "drain_poll_interval_ms must be greater than 0",
            ));
        }

        if let Some(ref pidfile) = daemon.pidfile {
            if pidfile.as_os_str().is_empty() {
                result.add_error(ValidationError::new(
                    "daemon.pidfile",
                    "pidfile cannot be empty",
                ));
            } else if pidfile.is_relative() {
                result.add_warning(ValidationWarning::new(
                    "daemon.pidfile",
                    "pidfile is relative, daemonizing changes the working directory to /",
                ));
            }
        }

        if matches!(daemon.user.as_deref(), Some("")) {
            result.add_error(ValidationError::new("daemon.user", "user cannot be empty"));
        }

        if matches!(daemon.group.as_deref(), Some("")) {
            result.add_error(ValidationError::new("daemon.group", "group cannot be empty"));
        }
    }

    fn validate_logging(snapshot: &ConfigSnapshot, result: &mut ValidationResult) {
        let logging = &snapshot.logging;

        if !Self::is_level(&logging.level) {
            result.add_error(ValidationError::new(
                "logging.level",
                format!(
                    "Unknown level '{}', valid values: {:?}",
                    logging.level, LEVELS
                ),
            ));
        }

        for (target, level) in &logging.targets {
            if target.trim().is_empty() {
                result.add_error(ValidationError::new(
                    "logging.targets",
                    "target name cannot be empty",
                ));
            }
            if !Self::is_level(level) {
                result.add_error(ValidationError::new(
                    format!("logging.targets.{}", target),
                    format!("Unknown level '{}', valid values: {:?}", level, LEVELS),
                ));
            }
        }

        if let Some(ref file) = logging.file {
            if file.prefix.trim().is_empty() {
                result.add_error(ValidationError::new(
                    "logging.file.prefix",
                    "prefix cannot be empty",
                ));
            }
        }

        if !logging.console.enabled && logging.file.is_none() {
            result.add_warning(ValidationWarning::new(
                "logging",
                "no log sink configured, all output will be discarded",
            ));
        }
    }

    fn is_level(level: &str) -> bool {
        LEVELS.contains(&level.trim().to_lowercase().as_str())
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
