//! Config - 設定ファイル（TOML）
//!
//! すべてのセクションにデフォルト値があるので、空のファイルでも起動できる。
//!
//! ```toml
//! [scheduler]
//! executor_ttl = "11days 13h 46m 40s"
//! sweep_interval = "30s"
//!
//! [poller]
//! poll_period = "5s"
//! max_attempts = 20
//!
//! [engine]
//! upload_request_window = "2m"
//!
//! [detectors]
//! interval = "30s"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

pub mod duration_format;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoneConfig {
    pub scheduler: SchedulerConfig,
    pub poller: PollerConfig,
    pub engine: EngineConfig,
    pub detectors: DetectorConfig,
    pub logging: LoggingConfig,
}

/// Per-task executor registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Idle time after which a task's executor is reclaimed.
    #[serde(with = "duration_format")]
    pub executor_ttl: Duration,
    /// How often the reaper sweeps expired executors.
    #[serde(with = "duration_format")]
    pub sweep_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            executor_ttl: Duration::from_millis(1_000_000_000),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    #[serde(with = "duration_format")]
    pub poll_period: Duration,
    pub max_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_period: Duration::from_secs(5),
            max_attempts: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a requested upload may stay unaccepted before another
    /// revealed worker is asked.
    #[serde(with = "duration_format")]
    pub upload_request_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            upload_request_window: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    #[serde(with = "duration_format")]
    pub interval: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl KeystoneConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: KeystoneConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("scheduler.executor_ttl", self.scheduler.executor_ttl),
            ("scheduler.sweep_interval", self.scheduler.sweep_interval),
            ("poller.poll_period", self.poller.poll_period),
            ("detectors.interval", self.detectors.interval),
        ];
        for (name, value) in periods {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        if self.poller.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "poller.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Read and validate a config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<KeystoneConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    KeystoneConfig::from_toml_str(&raw)
}
