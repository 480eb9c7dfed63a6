//! Configuration sources.
//!
//! The runtime only needs two things from a source: a way to load a fresh
//! snapshot and a way to tell whether it differs from the current one.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::ConfigError;
use crate::loader::ConfigLoader;
use crate::schema::ConfigSnapshot;
use crate::validator::ConfigValidator;

/// Supplies configuration snapshots on demand.
pub trait ConfigSource: Send + Sync {
    /// Load a fresh snapshot.
    fn load(&self) -> Result<ConfigSnapshot, ConfigError>;

    /// Whether `new` differs from `old`.
    fn has_changed(&self, old: &ConfigSnapshot, new: &ConfigSnapshot) -> bool {
        old != new
    }

    /// Human readable origin, used in log messages.
    fn describe(&self) -> String;
}

/// Reads snapshots from a TOML, YAML or JSON file.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    /// Create a source for `path`, which must exist.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let expanded = ConfigLoader::expand_path(&path.as_ref().to_string_lossy());
        let path = std::path::absolute(expanded)?;
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Ok(Self { path })
    }

    /// Get the absolute configuration path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<ConfigSnapshot, ConfigError> {
        info!("Loading configuration from {}", self.path.display());
        let snapshot = ConfigLoader::load(&self.path)?;

        let result = ConfigValidator::validate(&snapshot)?;
        for warning in &result.warnings {
            warn!("Configuration warning at {}: {}", warning.path, warning.message);
        }
        if let Some(error) = result.errors.into_iter().next() {
            return Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            });
        }

        Ok(snapshot)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Always yields the same snapshot. Used when no configuration file is given.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    snapshot: ConfigSnapshot,
}

impl StaticConfigSource {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self { snapshot }
    }
}

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<ConfigSnapshot, ConfigError> {
        Ok(self.snapshot.clone())
    }

    fn describe(&self) -> String {
        "built-in defaults".to_string()
    }
}
