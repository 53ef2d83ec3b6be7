use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PullError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "event_pull.toml";
pub const CONFIG_PATH_ENV: &str = "EVENT_PULL_CONFIG";
pub const SQLITE_PATH_ENV: &str = "EVENT_PULL_SQLITE_PATH";
pub const METRICS_PORT_ENV: &str = "EVENT_PULL_METRICS_PORT";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub reconcile: ReconcileConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            sqlite_path: PathBuf::from("data/event_pull.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// How many times a create that lost a unique-key race re-queries before
    /// giving up with the persistence error.
    pub conflict_retries: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { conflict_retries: 1 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Daily-rolling JSON logs go here. Console only when unset.
    pub directory: Option<PathBuf>,
    /// Used when RUST_LOG is not set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            filter: "event_pull=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9898,
        }
    }
}

impl Config {
    /// Load from `$EVENT_PULL_CONFIG` or `event_pull.toml`, then apply
    /// environment overrides. A missing file means defaults.
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PullError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = env::var(SQLITE_PATH_ENV) {
            self.storage.sqlite_path = PathBuf::from(path);
        }
        if let Ok(port) = env::var(METRICS_PORT_ENV) {
            self.metrics.port = port.parse().map_err(|_| {
                PullError::Config(format!("{} must be a port number, got '{}'", METRICS_PORT_ENV, port))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.reconcile.conflict_retries, 1);
        assert_eq!(config.logging.filter, "event_pull=info");
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [storage]
            backend = "sqlite"
            sqlite_path = "/tmp/events.db"

            [reconcile]
            conflict_retries = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.sqlite_path, PathBuf::from("/tmp/events.db"));
        assert_eq!(config.reconcile.conflict_retries, 3);
        assert_eq!(config.metrics.port, 9898);
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::from_toml(include_str!("../event_pull.example.toml")).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.logging.directory, None);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let err = Config::from_toml("[storage]\nbackend = \"postgres\"").unwrap_err();
        assert!(matches!(err, PullError::Toml(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\ndirectory = \"logs\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.logging.directory, Some(PathBuf::from("logs")));

        assert!(matches!(
            Config::from_file("/nonexistent/event_pull.toml"),
            Err(PullError::Config(_))
        ));
    }
}
