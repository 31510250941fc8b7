//! Daemon configuration
//!
//! Read from `CONFER_CONFIG` or `<config dir>/confer.toml`. A missing file
//! means defaults; `CONFER_*` environment variables override the file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Could not determine {0} directory")]
    NoProjectDirs(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub translation: TranslationConfig,
    pub conference: ConferenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Defaults to `<data dir>/confer.db`
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslationConfig {
    /// Without a URL every translation degrades to the fallback marker
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConferenceConfig {
    pub code_max_attempts: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], confer_net::DEFAULT_PORT)),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            timeout_ms: 3000,
        }
    }
}

impl Default for ConferenceConfig {
    fn default() -> Self {
        Self {
            code_max_attempts: confer_core::code::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl TranslationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    /// Load from the default location with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var_os("CONFER_CONFIG") {
            Some(path) => PathBuf::from(path),
            None => project_dirs("config")?.config_dir().join("confer.toml"),
        };

        let mut config = Self::from_file(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a config file; a missing file yields defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `CONFER_*` overrides from `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CONFER_LISTEN_ADDR") {
            self.server.listen_addr = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CONFER_LISTEN_ADDR",
                value,
            })?;
        }
        if let Some(value) = lookup("CONFER_DATABASE") {
            self.storage.database_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("CONFER_TRANSLATION_URL") {
            self.translation.api_url = Some(value).filter(|v| !v.is_empty());
        }
        if let Some(value) = lookup("CONFER_TRANSLATION_KEY") {
            self.translation.api_key = Some(value).filter(|v| !v.is_empty());
        }
        Ok(())
    }

    /// Configured database path, or the platform data directory
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(project_dirs("data")?.data_dir().join("confer.db")),
        }
    }
}

fn project_dirs(kind: &'static str) -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("dev", "onyx", "confer").ok_or(ConfigError::NoProjectDirs(kind))
}
