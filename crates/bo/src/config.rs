use bo_core::RetryPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DB_PATH: &str = ".boxoffice/boxoffice.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Read { path: String, message: String },
    #[error("invalid config: {message}")]
    Parse { message: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    database: DatabaseSection,
    retry: RetrySection,
    booking: BookingSection,
    log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DatabaseSection {
    path: Option<PathBuf>,
    busy_timeout_ms: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RetrySection {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BookingSection {
    deadline_ms: Option<u64>,
}

/// Values taken from flags or `BOXOFFICE_*` variables. They win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_path: Option<PathBuf>,
    pub busy_timeout_ms: Option<u32>,
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub deadline_ms: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_path: PathBuf,
    pub busy_timeout_ms: u32,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub deadline_ms: Option<u64>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            max_attempts: bo_core::retry::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: 10,
            deadline_ms: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Defaults, then the file at `path` if one was named, then `overrides`.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|err| ConfigError::Read {
                    path: path.display().to_string(),
                    message: err.to_string(),
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply(overrides);
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|err| ConfigError::Parse {
            message: err.to_string(),
        })?;
        let mut config = Self::default();
        config.apply(&Overrides {
            database_path: file.database.path,
            busy_timeout_ms: file.database.busy_timeout_ms,
            max_attempts: file.retry.max_attempts,
            base_delay_ms: file.retry.base_delay_ms,
            deadline_ms: file.booking.deadline_ms,
            log_level: file.log_level,
        });
        Ok(config)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(path) = &overrides.database_path {
            self.database_path.clone_from(path);
        }
        if let Some(busy_timeout_ms) = overrides.busy_timeout_ms {
            self.busy_timeout_ms = busy_timeout_ms;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.max_attempts = if max_attempts < 1 {
                bo_core::retry::DEFAULT_MAX_ATTEMPTS
            } else {
                max_attempts
            };
        }
        if let Some(base_delay_ms) = overrides.base_delay_ms {
            self.base_delay_ms = base_delay_ms;
        }
        if overrides.deadline_ms.is_some() {
            self.deadline_ms = overrides.deadline_ms;
        }
        if let Some(log_level) = &overrides.log_level {
            self.log_level.clone_from(log_level);
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.busy_timeout_ms))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}
