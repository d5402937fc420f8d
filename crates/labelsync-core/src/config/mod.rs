//! Client configuration for a sync session.
//!
//! Values come either from code (builder methods) or from `LABELSYNC_*`
//! environment variables via [`ClientConfig::from_env`].

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Change-feed cadence used when nothing else is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_VERSION_LIMIT: usize = 50;

#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the template service, without trailing slash
    pub api_base_url: String,
    /// Bearer token attached to every request
    pub access_token: Option<String>,
    /// Session user, stamped on saves, restores and notifications
    pub user_id: String,
    pub user_name: Option<String>,
    /// Device token; generated when absent
    pub device_id: Option<String>,
    pub request_timeout: Duration,
    /// Number of versions kept in the local history list
    pub version_limit: usize,
    /// Autosave cadence (`None` disables autosave)
    pub autosave_interval: Option<Duration>,
    /// Change-feed cadence (`None` disables polling)
    pub poll_interval: Option<Duration>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_id", &self.user_id)
            .field("user_name", &self.user_name)
            .field("device_id", &self.device_id)
            .field("request_timeout", &self.request_timeout)
            .field("version_limit", &self.version_limit)
            .field("autosave_interval", &self.autosave_interval)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration with default cadences.
    pub fn new(api_base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            access_token: None,
            user_id: user_id.into(),
            user_name: None,
            device_id: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            version_limit: DEFAULT_VERSION_LIMIT,
            autosave_interval: None,
            poll_interval: Some(DEFAULT_POLL_INTERVAL),
        }
    }

    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    #[must_use]
    pub const fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval = Some(interval);
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Disable change-feed polling
    #[must_use]
    pub const fn without_polling(mut self) -> Self {
        self.poll_interval = None;
        self
    }

    #[must_use]
    pub const fn with_version_limit(mut self, limit: usize) -> Self {
        self.version_limit = limit;
        self
    }

    /// Check the values that the builder methods cannot enforce.
    pub fn validate(&self) -> Result<()> {
        normalize_base_url(&self.api_base_url)?;
        if self.user_id.trim().is_empty() {
            return Err(Error::Config("user id must not be empty".to_string()));
        }
        if self.version_limit == 0 {
            return Err(Error::Config("version limit must be at least 1".to_string()));
        }
        if self.autosave_interval.is_some_and(|interval| interval.is_zero())
            || self.poll_interval.is_some_and(|interval| interval.is_zero())
        {
            return Err(Error::Config(
                "timer intervals must be positive; use None to disable".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_env() -> Result<Self> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_base_url = required_trimmed(&lookup, "LABELSYNC_API_BASE_URL")?;
        let api_base_url = normalize_base_url(&api_base_url)?;
        let user_id = required_trimmed(&lookup, "LABELSYNC_USER_ID")?;

        let request_timeout_secs = parse_u64(&lookup, "LABELSYNC_REQUEST_TIMEOUT_SECS", 10)?;
        if !(1..=300).contains(&request_timeout_secs) {
            return Err(Error::Config(
                "LABELSYNC_REQUEST_TIMEOUT_SECS must be in [1, 300]".to_string(),
            ));
        }

        let version_limit = parse_u64(&lookup, "LABELSYNC_VERSION_LIMIT", 50)?;
        if !(1..=1_000).contains(&version_limit) {
            return Err(Error::Config(
                "LABELSYNC_VERSION_LIMIT must be in [1, 1000]".to_string(),
            ));
        }

        let autosave_secs = parse_u64(&lookup, "LABELSYNC_AUTOSAVE_INTERVAL_SECS", 0)?;
        let poll_ms = parse_u64(
            &lookup,
            "LABELSYNC_POLL_INTERVAL_MS",
            u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(2000),
        )?;

        Ok(Self {
            api_base_url,
            access_token: optional_trimmed(&lookup, "LABELSYNC_ACCESS_TOKEN"),
            user_id,
            user_name: optional_trimmed(&lookup, "LABELSYNC_USER_NAME"),
            device_id: optional_trimmed(&lookup, "LABELSYNC_DEVICE_ID"),
            request_timeout: Duration::from_secs(request_timeout_secs),
            version_limit: usize::try_from(version_limit).unwrap_or(DEFAULT_VERSION_LIMIT),
            autosave_interval: (autosave_secs > 0).then(|| Duration::from_secs(autosave_secs)),
            poll_interval: (poll_ms > 0).then(|| Duration::from_millis(poll_ms)),
        })
    }
}

/// Trim and validate a service base URL.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(Error::Config("API base URL must not be empty".to_string()));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}

fn required_trimmed(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    optional_trimmed(lookup, name)
        .ok_or_else(|| Error::Config(format!("missing required environment variable: {name}")))
}

fn optional_trimmed(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    non_blank(lookup(name))
}

/// Trimmed value, or `None` when absent or blank.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> Result<u64> {
    match optional_trimmed(lookup, name) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| Error::Config(format!("{name} must be a non-negative integer"))),
        None => Ok(default),
    }
}
