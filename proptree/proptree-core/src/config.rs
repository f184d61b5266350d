//! Configuration for proptree.
//!
//! Configuration is a TOML file, by default `config.toml` in the platform
//! configuration directory for `proptree` (override with
//! `PROPTREE_CONFIG_PATH`). Selected values can be overridden from the
//! environment; overrides are applied after the file is parsed and before
//! validation.
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [coordination]
//! address = "ws://127.0.0.1:8000"
//! namespace = "proptree"
//! database = "main"
//!
//! [coordination.retry]
//! base_sleep_ms = 1000
//! max_retries = 3
//! max_sleep_ms = 10000
//!
//! [console]
//! root = "u1"
//!
//! [watch]
//! files = ["/etc/app/app.properties"]
//! ```

use crate::error::{ProptreeError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

// Environment variable names
pub const ENV_CONFIG_PATH: &str = "PROPTREE_CONFIG_PATH";
pub const ENV_LOG_LEVEL: &str = "PROPTREE_LOG_LEVEL";
pub const ENV_COORDINATION_ADDRESS: &str = "PROPTREE_COORDINATION_ADDRESS";
pub const ENV_COORDINATION_NAMESPACE: &str = "PROPTREE_COORDINATION_NAMESPACE";
pub const ENV_COORDINATION_DATABASE: &str = "PROPTREE_COORDINATION_DATABASE";
pub const ENV_COORDINATION_USERNAME: &str = "PROPTREE_COORDINATION_USERNAME";
pub const ENV_COORDINATION_PASSWORD: &str = "PROPTREE_COORDINATION_PASSWORD";
pub const ENV_ROOT: &str = "PROPTREE_ROOT";

/// Address scheme served by the in-process coordination tree.
pub const MEMORY_ADDRESS: &str = "memory://";

/// Coordination store used when no address is configured.
pub const DEFAULT_ADDRESS: &str = "ws://127.0.0.1:8000";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProptreeConfig {
    #[serde(default)]
    general: GeneralConfig,
    #[serde(default)]
    coordination: CoordinationConfig,
    #[serde(default)]
    console: ConsoleConfig,
    #[serde(default)]
    watch: WatchConfig,
}

/// General settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

/// Coordination store session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// `memory://` for the in-process tree, anything else is handed to SurrealDB
    pub address: String,
    pub namespace: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub retry: RetryConfig,
}

/// Exponential backoff applied while establishing the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Sleep before the first retry
    pub base_sleep_ms: u64,
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Upper bound for a single sleep
    pub max_sleep_ms: u64,
}

/// Console settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Namespace root the console operates on
    pub root: String,
}

/// Files watched by `proptree watch-file` when none are given
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            namespace: "proptree".to_string(),
            database: "main".to_string(),
            username: None,
            password: None,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_sleep_ms: 1000,
            max_retries: 3,
            max_sleep_ms: 10_000,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            root: "default".to_string(),
        }
    }
}

impl Default for ProptreeConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            coordination: CoordinationConfig::default(),
            console: ConsoleConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based), doubling from the base.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_sleep_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_sleep_ms))
    }
}

impl CoordinationConfig {
    /// Configuration pointing at the given address with default settings otherwise
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn is_memory(&self) -> bool {
        self.address == MEMORY_ADDRESS
    }
}

impl ProptreeConfig {
    /// Load configuration from the default location
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path).await
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProptreeError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml(&content)?;
        config.merge_env_vars();
        config.validate()?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load from `path` (or the default location) if present, defaults otherwise
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if path.exists() {
            Self::load_from_path(&path).await
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            let mut config = Self::default();
            config.merge_env_vars();
            config.validate()?;
            Ok(config)
        }
    }

    /// Parse configuration from TOML text without applying overrides
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ProptreeError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to a specific path atomically
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized or written
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ProptreeError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ProptreeError::config(format!("Failed to serialize config: {}", e)))?;

        // Write to temp file, then rename
        let temp_path = path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| ProptreeError::config(format!("Failed to write config file: {}", e)))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| ProptreeError::config(format!("Failed to rename config file: {}", e)))?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !VALID_LOG_LEVELS.contains(&self.general.log_level.as_str()) {
            return Err(ProptreeError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.general.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }
        if self.coordination.address.trim().is_empty() {
            return Err(ProptreeError::config("Coordination address cannot be empty"));
        }
        if self.coordination.namespace.is_empty() {
            return Err(ProptreeError::config("Namespace cannot be empty"));
        }
        if self.coordination.database.is_empty() {
            return Err(ProptreeError::config("Database name cannot be empty"));
        }
        if self.coordination.retry.base_sleep_ms == 0 {
            return Err(ProptreeError::config("Retry base sleep must be greater than 0"));
        }
        if self.coordination.retry.max_sleep_ms < self.coordination.retry.base_sleep_ms {
            return Err(ProptreeError::config(
                "Retry max sleep must not be smaller than the base sleep",
            ));
        }
        let root = self.console.root.trim_matches('/');
        if root.is_empty() {
            return Err(ProptreeError::config("Console root cannot be empty"));
        }
        Ok(())
    }

    /// Merge environment variable overrides into the configuration
    pub fn merge_env_vars(&mut self) {
        if let Ok(log_level) = std::env::var(ENV_LOG_LEVEL) {
            debug!("Overriding log_level from environment: {}", log_level);
            self.general.log_level = log_level;
        }

        if let Ok(address) = std::env::var(ENV_COORDINATION_ADDRESS) {
            debug!("Overriding coordination address from environment: {}", address);
            self.coordination.address = address;
        }

        if let Ok(namespace) = std::env::var(ENV_COORDINATION_NAMESPACE) {
            debug!("Overriding coordination namespace from environment: {}", namespace);
            self.coordination.namespace = namespace;
        }

        if let Ok(database) = std::env::var(ENV_COORDINATION_DATABASE) {
            debug!("Overriding coordination database from environment: {}", database);
            self.coordination.database = database;
        }

        if let Ok(username) = std::env::var(ENV_COORDINATION_USERNAME) {
            debug!("Overriding coordination username from environment");
            self.coordination.username = Some(username);
        }

        if let Ok(password) = std::env::var(ENV_COORDINATION_PASSWORD) {
            debug!("Overriding coordination password from environment");
            self.coordination.password = Some(password);
        }

        if let Ok(root) = std::env::var(ENV_ROOT) {
            debug!("Overriding console root from environment: {}", root);
            self.console.root = root;
        }
    }

    /// Default configuration file location
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            return Ok(PathBuf::from(path));
        }

        ProjectDirs::from("", "", "proptree")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or_else(|| ProptreeError::config("Could not determine configuration directory"))
    }

    pub fn general(&self) -> &GeneralConfig {
        &self.general
    }

    pub fn general_mut(&mut self) -> &mut GeneralConfig {
        &mut self.general
    }

    pub fn coordination(&self) -> &CoordinationConfig {
        &self.coordination
    }

    pub fn coordination_mut(&mut self) -> &mut CoordinationConfig {
        &mut self.coordination
    }

    pub fn console(&self) -> &ConsoleConfig {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut ConsoleConfig {
        &mut self.console
    }

    pub fn watch(&self) -> &WatchConfig {
        &self.watch
    }

    pub fn watch_mut(&mut self) -> &mut WatchConfig {
        &mut self.watch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProptreeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.coordination().address, DEFAULT_ADDRESS);
        assert!(!config.coordination().is_memory());
        assert!(CoordinationConfig::with_address(MEMORY_ADDRESS).is_memory());
        assert_eq!(config.coordination().retry.base_sleep_ms, 1000);
        assert_eq!(config.coordination().retry.max_retries, 3);
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let retry = RetryConfig {
            base_sleep_ms: 1000,
            max_retries: 3,
            max_sleep_ms: 3000,
        };
        assert_eq!(retry.delay_for(1), Duration::from_millis(1000));
        assert_eq!(retry.delay_for(2), Duration::from_millis(2000));
        assert_eq!(retry.delay_for(3), Duration::from_millis(3000));
        assert_eq!(retry.delay_for(40), Duration::from_millis(3000));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ProptreeConfig::from_toml(
            r#"
            [console]
            root = "u1"
            "#,
        )
        .unwrap();
        assert_eq!(config.console().root, "u1");
        assert_eq!(config.general().log_level, "info");
        assert_eq!(config.coordination().namespace, "proptree");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ProptreeConfig::default();
        config.general_mut().log_level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = ProptreeConfig::default();
        config.console_mut().root = "/".to_string();
        assert!(config.validate().is_err());

        let mut config = ProptreeConfig::default();
        config.coordination_mut().retry.max_sleep_ms = 10;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ProptreeConfig::default();
        config.console_mut().root = "tenant-a".to_string();
        config.watch_mut().files.push(PathBuf::from("/etc/app/app.properties"));
        config.save_to_path(&path).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let loaded = ProptreeConfig::from_toml(&content).unwrap();
        assert_eq!(loaded, config);
    }
}
