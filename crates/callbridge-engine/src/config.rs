//! Bridge configuration (callbridge.toml)
//!
//! Every section and field is optional; missing values take their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scheduler::FaultPolicy;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Task scheduling settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset (default: "info")
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Colored output (default: true)
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

fn default_ansi() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            ansi: default_ansi(),
        }
    }
}

/// Task scheduling settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// What a task does after it fails (default: continue)
    #[serde(default)]
    pub fault_policy: FaultPolicy,

    /// Upper bound on tasks run per tick, 0 for unlimited
    #[serde(default)]
    pub max_tasks_per_tick: usize,
}

impl BridgeConfig {
    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "logging.filter cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.logging.filter, "info");
        assert!(config.logging.ansi);
        assert_eq!(config.scheduler.fault_policy, FaultPolicy::Continue);
        assert_eq!(config.scheduler.max_tasks_per_tick, 0);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[logging]
filter = "callbridge_engine=debug"
ansi = false

[scheduler]
fault_policy = "stop"
max_tasks_per_tick = 64
"#;
        let config = BridgeConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.logging.filter, "callbridge_engine=debug");
        assert!(!config.logging.ansi);
        assert_eq!(config.scheduler.fault_policy, FaultPolicy::Stop);
        assert_eq!(config.scheduler.max_tasks_per_tick, 64);
    }

    #[test]
    fn test_partial_section() {
        let config = BridgeConfig::from_toml_str("[scheduler]\nmax_tasks_per_tick = 8\n").unwrap();
        assert_eq!(config.scheduler.fault_policy, FaultPolicy::Continue);
        assert_eq!(config.scheduler.max_tasks_per_tick, 8);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_rejects_empty_filter() {
        let err = BridgeConfig::from_toml_str("[logging]\nfilter = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unknown_fault_policy() {
        let err = BridgeConfig::from_toml_str("[scheduler]\nfault_policy = \"retry\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\nfault_policy = \"stop\"").unwrap();

        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.scheduler.fault_policy, FaultPolicy::Stop);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BridgeConfig::load(&dir.path().join("callbridge.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
