//! Configuration for the APOD source.

use crate::errors::ConfigError;
use crate::pipeline::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the NASA API key.
pub const API_KEY_ENV: &str = "NASA_API_KEY";

/// Environment variable overriding the API base URL.
pub const BASE_URL_ENV: &str = "APOD_BASE_URL";

/// The public rate-limited key accepted by api.nasa.gov.
pub const DEMO_KEY: &str = "DEMO_KEY";

/// Configuration for fetching APOD records.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApodConfig {
    /// API root, without trailing path.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the APOD endpoint under `base_url`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key sent as the `api_key` query parameter.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Retry policy of the steps touching the network or the database.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    "https://api.nasa.gov".to_string()
}

fn default_endpoint() -> String {
    "planetary/apod".to_string()
}

fn default_api_key() -> String {
    DEMO_KEY.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ApodConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            endpoint: default_endpoint(),
            api_key: default_api_key(),
            timeout_seconds: default_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

impl std::fmt::Debug for ApodConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApodConfig")
            .field("base_url", &self.base_url)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("timeout_seconds", &self.timeout_seconds)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ApodConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `NASA_API_KEY` and `APOD_BASE_URL` from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// Unset or blank variables keep their defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut config = Self::default();
        if let Some(key) = read(API_KEY_ENV) {
            config.api_key = key;
        }
        if let Some(url) = read(BASE_URL_ENV) {
            config.base_url = url;
        }
        config
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Returns the full endpoint URL.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::new(
                "base_url",
                format!("'{}' is not an http(s) URL", self.base_url),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::new("endpoint", "must not be empty"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::new("api_key", "must not be empty"));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::new("timeout_seconds", "must be positive"));
        }
        Ok(())
    }
}
