use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    /// How long change notifications stay in the feed
    pub change_retention: Duration,
    /// Upper bound applied to `limit` on version listings
    pub max_version_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8090".to_string(),
            change_retention: Duration::from_secs(30),
            max_version_limit: 200,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "LABELSYNC_API_BIND_ADDR", "127.0.0.1:8090");

        let retention_secs = value_or_default(&lookup, "LABELSYNC_CHANGE_RETENTION_SECS", "30")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "LABELSYNC_CHANGE_RETENTION_SECS must be an integer in [1, 3600]".to_string(),
                )
            })?;
        if !(1..=3_600).contains(&retention_secs) {
            return Err(ConfigError::Invalid(
                "LABELSYNC_CHANGE_RETENTION_SECS must be in [1, 3600]".to_string(),
            ));
        }

        let max_version_limit = value_or_default(&lookup, "LABELSYNC_MAX_VERSION_LIMIT", "200")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "LABELSYNC_MAX_VERSION_LIMIT must be an integer in [1, 10000]".to_string(),
                )
            })?;
        if !(1..=10_000).contains(&max_version_limit) {
            return Err(ConfigError::Invalid(
                "LABELSYNC_MAX_VERSION_LIMIT must be in [1, 10000]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            change_retention: Duration::from_secs(retention_secs),
            max_version_limit,
        })
    }
}

fn value_or_default(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
