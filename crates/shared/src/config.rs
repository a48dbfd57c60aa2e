//! Configuration for the lifecycle-manager plugin
//!
//! Configuration is loaded once at startup, fail-fast: missing required
//! variables are reported immediately, no silent fallbacks. Values from an
//! optional `.env` file take precedence over the process environment, which
//! keeps local development overrides out of the system environment.
//!
//! # Environment Variables
//!
//! ## Required
//! - `HAIZEA_NATS_URL`: NATS connection URL (comma-separated for clustering)
//! - `HAIZEA_REPOSITORY_URL`: Base URL of the record repository
//!
//! ## Optional
//! - `HAIZEA_PLUGIN_NAME`: Bus identity of this plugin (default: "haizea-fpga-lm")
//! - `HAIZEA_POOL_SIZE`: Worker-pool size for task execution (default: 10)
//! - `HAIZEA_STEP_TIMEOUT_SECS`: Deadline for asynchronous steps (default: 120)
//! - `HAIZEA_NATS_TIMEOUT_SECS`: NATS connection timeout (default: 10)
//! - `HAIZEA_NATS_MAX_RECONNECTS`: Max reconnect attempts (default: infinite)
//! - `RUST_LOG`: Log level (default: "info")

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingRequired { var: String },

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load env file {path}: {source}")]
    EnvFileLoad {
        path: PathBuf,
        source: dotenv::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// NATS connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsSettings {
    pub urls: Vec<String>,
    pub timeout_secs: u64,
    pub max_reconnects: Option<usize>,
}

impl NatsSettings {
    /// Build NATS settings from environment variables
    pub fn from_env() -> Result<Self> {
        let urls_str =
            std::env::var("HAIZEA_NATS_URL").map_err(|_| ConfigError::MissingRequired {
                var: "HAIZEA_NATS_URL".to_string(),
            })?;

        let urls: Vec<String> = urls_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if urls.is_empty() {
            return Err(ConfigError::InvalidValue {
                var: "HAIZEA_NATS_URL".to_string(),
                value: urls_str,
            });
        }

        let timeout_secs = parse_optional_var("HAIZEA_NATS_TIMEOUT_SECS", 10)?;

        let max_reconnects = std::env::var("HAIZEA_NATS_MAX_RECONNECTS")
            .ok()
            .and_then(|s| s.parse().ok());

        Ok(Self {
            urls,
            timeout_secs,
            max_reconnects,
        })
    }

    /// Returns the primary URL for connection
    pub fn primary_url(&self) -> &str {
        self.urls
            .first()
            .map(|s| s.as_str())
            .unwrap_or("nats://localhost:4222")
    }
}

/// Complete configuration of the lifecycle-manager plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Bus identity; used as the envelope sender and to skip self-published
    /// messages on shared subjects
    pub plugin_name: String,
    pub nats: NatsSettings,
    /// Base URL of the record repository collaborator
    pub repository_url: String,
    /// Platform-wide bound on concurrent task executions
    pub worker_pool_size: usize,
    /// Deadline applied to every asynchronous step
    pub step_timeout_secs: u64,
}

impl PluginConfig {
    /// Build plugin configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let plugin_name =
            std::env::var("HAIZEA_PLUGIN_NAME").unwrap_or_else(|_| "haizea-fpga-lm".to_string());

        let repository_url =
            std::env::var("HAIZEA_REPOSITORY_URL").map_err(|_| ConfigError::MissingRequired {
                var: "HAIZEA_REPOSITORY_URL".to_string(),
            })?;

        let worker_pool_size = parse_optional_var("HAIZEA_POOL_SIZE", 10)?;
        let step_timeout_secs = parse_optional_var("HAIZEA_STEP_TIMEOUT_SECS", 120)?;

        let config = Self {
            plugin_name,
            nats: NatsSettings::from_env()?,
            repository_url,
            worker_pool_size,
            step_timeout_secs,
        };

        validate_plugin_config(&config)?;

        Ok(config)
    }
}

/// Configuration loader
///
/// Loads configuration from an optional `.env` file, then the process
/// environment, then validates the result.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    env_file_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(env_file_path: Option<PathBuf>) -> Self {
        Self { env_file_path }
    }

    /// Load and validate the plugin configuration
    pub fn load_plugin_config(&self) -> Result<PluginConfig> {
        if let Some(path) = &self.env_file_path {
            self.load_env_file(path)?;
        }

        PluginConfig::from_env()
    }

    fn load_env_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(ConfigError::EnvFileLoad {
                path: path.to_path_buf(),
                source: dotenv::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path.display()),
                )),
            });
        }

        dotenv::from_path(path).map_err(|e| ConfigError::EnvFileLoad {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }
}

/// Validate NATS URLs (scheme check only; resolution happens at connect)
pub fn validate_nats_urls(urls: &[String]) -> Result<()> {
    for url in urls {
        if !url.starts_with("nats://") && !url.starts_with("tls://") {
            return Err(ConfigError::InvalidUrl(format!(
                "NATS URL must use nats:// or tls:// scheme, got: {}",
                url
            )));
        }
    }
    Ok(())
}

/// Validate the repository base URL
pub fn validate_repository_url(url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::InvalidUrl(format!(
            "Repository URL must use http:// or https:// scheme, got: {}",
            url
        )));
    }
    Ok(())
}

/// Validate the complete plugin configuration
pub fn validate_plugin_config(config: &PluginConfig) -> Result<()> {
    validate_nats_urls(&config.nats.urls)?;
    validate_repository_url(&config.repository_url)?;

    if config.worker_pool_size == 0 {
        return Err(ConfigError::InvalidValue {
            var: "HAIZEA_POOL_SIZE".to_string(),
            value: "must be at least 1".to_string(),
        });
    }

    if config.step_timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            var: "HAIZEA_STEP_TIMEOUT_SECS".to_string(),
            value: "must be at least 1 second".to_string(),
        });
    }

    Ok(())
}

/// Parse optional environment variable with default value
fn parse_optional_var<T>(var: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match std::env::var(var) {
        Ok(s) => s.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: s,
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_loader_new() {
        let loader = ConfigLoader::new(None);
        assert!(loader.env_file_path.is_none());

        let loader = ConfigLoader::new(Some(PathBuf::from(".env")));
        assert!(loader.env_file_path.is_some());
    }

    #[test]
    fn test_parse_optional_var() {
        unsafe { std::env::set_var("HAIZEA_TEST_VAR", "42") };
        let result: Result<u32> = parse_optional_var("HAIZEA_TEST_VAR", 10);
        assert_eq!(result.unwrap(), 42);

        unsafe { std::env::remove_var("HAIZEA_TEST_VAR") };
        let result: Result<u32> = parse_optional_var("HAIZEA_TEST_VAR", 10);
        assert_eq!(result.unwrap(), 10);

        unsafe { std::env::set_var("HAIZEA_TEST_VAR", "invalid") };
        let result: Result<u32> = parse_optional_var("HAIZEA_TEST_VAR", 10);
        assert!(result.is_err());

        unsafe { std::env::remove_var("HAIZEA_TEST_VAR") };
    }

    #[test]
    fn test_validate_nats_urls() {
        assert!(validate_nats_urls(&["nats://localhost:4222".to_string()]).is_ok());
        assert!(validate_nats_urls(&["tls://nats.example.com:4222".to_string()]).is_ok());
        assert!(validate_nats_urls(&["http://localhost:4222".to_string()]).is_err());
    }

    #[test]
    fn test_validate_repository_url() {
        assert!(validate_repository_url("http://repository:4012").is_ok());
        assert!(validate_repository_url("https://repository.example.com").is_ok());
        assert!(validate_repository_url("repository:4012").is_err());
    }

    #[test]
    fn test_validate_plugin_config_rejects_zero_pool() {
        let config = PluginConfig {
            plugin_name: "haizea-fpga-lm".to_string(),
            nats: NatsSettings {
                urls: vec!["nats://localhost:4222".to_string()],
                timeout_secs: 10,
                max_reconnects: None,
            },
            repository_url: "http://localhost:4012".to_string(),
            worker_pool_size: 0,
            step_timeout_secs: 120,
        };
        assert!(validate_plugin_config(&config).is_err());
    }

    #[test]
    fn test_validate_plugin_config_rejects_zero_timeout() {
        let config = PluginConfig {
            plugin_name: "haizea-fpga-lm".to_string(),
            nats: NatsSettings {
                urls: vec!["nats://localhost:4222".to_string()],
                timeout_secs: 10,
                max_reconnects: None,
            },
            repository_url: "http://localhost:4012".to_string(),
            worker_pool_size: 10,
            step_timeout_secs: 0,
        };
        assert!(validate_plugin_config(&config).is_err());
    }
}
