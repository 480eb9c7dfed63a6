//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::schema::ConfigSnapshot;

/// On-disk configuration format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension. Anything that is not TOML or
    /// JSON is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => ConfigFormat::Toml,
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a snapshot from a file, choosing the format by extension.
    pub fn load(path: &Path) -> Result<ConfigSnapshot, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content, ConfigFormat::from_path(path))
    }

    /// Load a snapshot from a string.
    pub fn load_str(content: &str, format: ConfigFormat) -> Result<ConfigSnapshot, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let mut snapshot: ConfigSnapshot = match format {
            ConfigFormat::Toml => toml::from_str(&expanded)?,
            ConfigFormat::Json => serde_json::from_str(&expanded)?,
            ConfigFormat::Yaml if expanded.trim().is_empty() => ConfigSnapshot::default(),
            ConfigFormat::Yaml => serde_yml::from_str(&expanded)?,
        };
        Self::expand_paths(&mut snapshot);
        Ok(snapshot)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    fn expand_paths(snapshot: &mut ConfigSnapshot) {
        if let Some(pidfile) = snapshot.daemon.pidfile.take() {
            snapshot.daemon.pidfile = Some(Self::expand_path_buf(&pidfile));
        }
        if let Some(file) = snapshot.logging.file.as_mut() {
            file.directory = Self::expand_path_buf(&file.directory);
        }
    }

    fn expand_path_buf(path: &Path) -> PathBuf {
        PathBuf::from(Self::expand_path(&path.to_string_lossy()))
    }

    /// Expand shell-style paths (e.g., `~/.config`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}
