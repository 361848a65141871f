//! Configuration management for the MAL client workspace.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings. Credentials are never part of the
//! configuration; callers supply them when building a client.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;

/// Default origin of the MAL service. The service is reached over plain HTTP.
pub const DEFAULT_BASE_URL: &str = "http://myanimelist.net";

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("mal-client/", env!("CARGO_PKG_VERSION"));

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// MAL service settings
    #[serde(default)]
    pub mal: MalConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MAL service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MalConfig {
    /// Base URL of the MAL service
    pub base_url: String,

    /// User agent sent with each request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds (None = transport default)
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log directory path
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for MalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: default_user_agent(),
            timeout_seconds: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            default_level: "info".to_string(),
            console: true,
            file: false,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mal: MalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load configuration from a TOML file or create default if not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::from_file(path).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Parse the configured log level, falling back to INFO
    pub fn log_level(&self) -> Level {
        self.logging
            .default_level
            .parse()
            .unwrap_or(Level::INFO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mal.base_url, "http://myanimelist.net");
        assert!(config.mal.user_agent.starts_with("mal-client/"));
        assert_eq!(config.mal.timeout_seconds, None);
        assert!(!config.logging.file);
    }

    #[test]
    fn test_save_and_load_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");

        let mut original_config = Config::default();
        original_config.mal.base_url = "http://localhost:8089".to_string();
        original_config.mal.timeout_seconds = Some(10);
        original_config.save(&config_path)?;

        assert!(config_path.exists());

        let loaded_config = Config::from_file(&config_path)?;
        assert_eq!(loaded_config.mal.base_url, "http://localhost:8089");
        assert_eq!(loaded_config.mal.timeout_seconds, Some(10));
        assert_eq!(
            loaded_config.logging.default_level,
            original_config.logging.default_level
        );

        Ok(())
    }

    #[test]
    fn test_partial_config_uses_defaults() -> Result<()> {
        let config: Config = toml::from_str(
            r#"
            [mal]
            base_url = "http://mal.example"
            "#,
        )?;

        assert_eq!(config.mal.base_url, "http://mal.example");
        assert_eq!(config.mal.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.logging.log_dir, "logs");
        Ok(())
    }

    #[test]
    fn test_logging_only_config() -> Result<()> {
        let config: Config = toml::from_str(
            r#"
            [logging]
            log_dir = "/var/log/mal"
            default_level = "warn"
            console = false
            file = true
            json_format = true
            "#,
        )?;

        assert_eq!(config.mal.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.log_level(), Level::WARN);
        assert!(config.logging.json_format);
        Ok(())
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        // Should return default config without error
        assert_eq!(config.mal.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_load_or_default_on_invalid_toml() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("broken.toml");
        std::fs::write(&config_path, "[mal\nbase_url = ")?;

        let config = Config::load_or_default(&config_path);
        assert_eq!(config.mal.base_url, DEFAULT_BASE_URL);
        Ok(())
    }

    #[test]
    fn test_log_level() {
        let mut config = Config::default();
        assert_eq!(config.log_level(), Level::INFO);

        config.logging.default_level = "debug".to_string();
        assert_eq!(config.log_level(), Level::DEBUG);

        config.logging.default_level = "chatty".to_string();
        assert_eq!(config.log_level(), Level::INFO);
    }
}
