//! Engine configuration.
//!
//! [`EngineConfig`] bundles the queue, performance monitor and registry
//! settings. It can be loaded from and saved to an INI file:
//!
//! ```ini
//! [queue]
//! max_retries = 3
//! retry_delay_ms = 100
//! max_queue_size = 100
//! timeout_secs = 30
//! ready_timeout_secs = 10
//!
//! [performance]
//! slow_operation_threshold_ms = 100
//! enable_metrics = true
//! log_slow_operations = true
//!
//! [registry]
//! validate_on_registration = true
//! allow_duplicate_ids = false
//! strict_mode = false
//! ```
//!
//! Missing keys keep their defaults; unknown keys are ignored.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::queue::OperationQueueConfig;
use crate::registry::RegistryConfig;
use crate::telemetry::PerformanceConfig;

/// File name of the engine configuration.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Directory under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "layerkeep";

/// Errors from loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value '{value}' for [{section}] {key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Configuration for the whole engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineConfig {
    pub queue: OperationQueueConfig,
    pub performance: PerformanceConfig,
    pub registry: RegistryConfig,
}

/// Typed reads from one INI section.
struct Section<'a> {
    name: &'static str,
    properties: Option<&'a Properties>,
}

impl Section<'_> {
    fn parse<T: FromStr>(&self, key: &str, target: &mut T) -> Result<(), ConfigError> {
        let Some(raw) = self.properties.and_then(|p| p.get(key)) else {
            return Ok(());
        };
        *target = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: raw.to_string(),
        })?;
        Ok(())
    }

    fn millis(&self, key: &str, target: &mut Duration) -> Result<(), ConfigError> {
        let mut ms = target.as_millis() as u64;
        self.parse(key, &mut ms)?;
        *target = Duration::from_millis(ms);
        Ok(())
    }

    fn secs(&self, key: &str, target: &mut Duration) -> Result<(), ConfigError> {
        let mut secs = target.as_secs();
        self.parse(key, &mut secs)?;
        *target = Duration::from_secs(secs);
        Ok(())
    }
}

impl EngineConfig {
    /// Default location: `<config dir>/layerkeep/config.ini`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from an INI file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ini_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded engine configuration");
        Ok(config)
    }

    /// Loads from `path` if it exists, otherwise returns defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parses INI text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let section = |name: &'static str| Section {
            name,
            properties: ini.section(Some(name)),
        };
        let mut config = Self::default();

        let queue = section("queue");
        queue.parse("max_retries", &mut config.queue.max_retries)?;
        queue.millis("retry_delay_ms", &mut config.queue.retry_delay)?;
        queue.parse("max_queue_size", &mut config.queue.max_queue_size)?;
        queue.secs("timeout_secs", &mut config.queue.timeout)?;
        queue.secs("ready_timeout_secs", &mut config.queue.ready_timeout)?;

        let performance = section("performance");
        performance.millis(
            "slow_operation_threshold_ms",
            &mut config.performance.slow_operation_threshold,
        )?;
        performance.parse("enable_metrics", &mut config.performance.enable_metrics)?;
        performance.parse(
            "log_slow_operations",
            &mut config.performance.log_slow_operations,
        )?;

        let registry = section("registry");
        registry.parse(
            "validate_on_registration",
            &mut config.registry.validate_on_registration,
        )?;
        registry.parse("allow_duplicate_ids", &mut config.registry.allow_duplicate_ids)?;
        registry.parse("strict_mode", &mut config.registry.strict_mode)?;

        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("queue"))
            .set("max_retries", self.queue.max_retries.to_string())
            .set(
                "retry_delay_ms",
                self.queue.retry_delay.as_millis().to_string(),
            )
            .set("max_queue_size", self.queue.max_queue_size.to_string())
            .set("timeout_secs", self.queue.timeout.as_secs().to_string())
            .set(
                "ready_timeout_secs",
                self.queue.ready_timeout.as_secs().to_string(),
            );
        ini.with_section(Some("performance"))
            .set(
                "slow_operation_threshold_ms",
                self.performance
                    .slow_operation_threshold
                    .as_millis()
                    .to_string(),
            )
            .set(
                "enable_metrics",
                self.performance.enable_metrics.to_string(),
            )
            .set(
                "log_slow_operations",
                self.performance.log_slow_operations.to_string(),
            );
        ini.with_section(Some("registry"))
            .set(
                "validate_on_registration",
                self.registry.validate_on_registration.to_string(),
            )
            .set(
                "allow_duplicate_ids",
                self.registry.allow_duplicate_ids.to_string(),
            )
            .set("strict_mode", self.registry.strict_mode.to_string());
        ini
    }

    /// Writes configuration to an INI file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        tracing::info!(path = %path.display(), "Saved engine configuration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ini_gives_defaults() {
        assert_eq!(EngineConfig::from_ini_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_ini_overrides() {
        let config = EngineConfig::from_ini_str(
            "[queue]\nmax_queue_size = 10\nretry_delay_ms = 250\nunknown = 1\n\n[registry]\nstrict_mode = true\n",
        )
        .unwrap();

        assert_eq!(config.queue.max_queue_size, 10);
        assert_eq!(config.queue.retry_delay, Duration::from_millis(250));
        assert_eq!(config.queue.max_retries, 3);
        assert!(config.registry.strict_mode);
        assert!(config.performance.enable_metrics);
    }

    #[test]
    fn test_invalid_value_rejected() {
        let err = EngineConfig::from_ini_str("[performance]\nenable_metrics = sometimes\n")
            .unwrap_err();
        match err {
            ConfigError::InvalidValue {
                section,
                key,
                value,
            } => {
                assert_eq!(section, "performance");
                assert_eq!(key, "enable_metrics");
                assert_eq!(value, "sometimes");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = EngineConfig::default();
        config.queue.timeout = Duration::from_secs(5);
        config.performance.log_slow_operations = false;
        config.save(&path).unwrap();

        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_or_default(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(matches!(
            EngineConfig::load(&dir.path().join("absent.ini")),
            Err(ConfigError::Io(_))
        ));
    }
}
