//! Configuration types for synchronized data sources
//!
//! All durations are expressed in milliseconds so that configuration files
//! and environment variables map onto the struct without conversion.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time-to-live for cached data (30 minutes)
pub const DEFAULT_TTL_MS: u64 = 30 * 60 * 1000;

/// Default delay before retrying a failed or skipped fetch (62 seconds)
pub const DEFAULT_TIME_TO_RETRY_MS: u64 = 62 * 1000;

/// Slack added to the TTL-based poll delay so the timer never races exact expiry
pub const POLL_EPSILON_MS: u64 = 10;

/// Configuration for a single synchronized data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source name, used to tag actions and derive storage keys
    pub name: String,

    /// Duration after which cached data is stale
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Delay before retrying after a failure or a skipped fetch
    #[serde(default = "default_time_to_retry_ms")]
    pub time_to_retry_ms: u64,

    /// Whether the source refetches on a timer after every successful fetch
    #[serde(default)]
    pub polling: bool,

    /// Store key for the data (defaults to `{name}Data`)
    #[serde(default)]
    pub data_storage_key: Option<String>,

    /// Store key for the fetch timestamp (defaults to `{name}Timestamp`)
    #[serde(default)]
    pub timestamp_storage_key: Option<String>,

    /// Push filters to subscribe once the source is initialized
    #[serde(default)]
    pub subscription_filters: Vec<String>,
}

impl SourceConfig {
    /// Create a configuration with defaults for everything but the name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ttl_ms: default_ttl_ms(),
            time_to_retry_ms: default_time_to_retry_ms(),
            polling: false,
            data_storage_key: None,
            timestamp_storage_key: None,
            subscription_filters: Vec::new(),
        }
    }

    /// Set the time-to-live
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Set the retry interval
    pub fn with_time_to_retry(mut self, delay: Duration) -> Self {
        self.time_to_retry_ms = delay.as_millis() as u64;
        self
    }

    /// Enable or disable polling
    pub fn with_polling(mut self, polling: bool) -> Self {
        self.polling = polling;
        self
    }

    /// Override the data storage key
    pub fn with_data_storage_key(mut self, key: impl Into<String>) -> Self {
        self.data_storage_key = Some(key.into());
        self
    }

    /// Override the timestamp storage key
    pub fn with_timestamp_storage_key(mut self, key: impl Into<String>) -> Self {
        self.timestamp_storage_key = Some(key.into());
        self
    }

    /// Set the push filters
    pub fn with_subscription_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscription_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::config("name must be defined"));
        }
        if self.ttl_ms == 0 {
            return Err(crate::Error::config(format!(
                "{}: ttl must be > 0",
                self.name
            )));
        }
        if self.time_to_retry_ms == 0 {
            return Err(crate::Error::config(format!(
                "{}: time to retry must be > 0",
                self.name
            )));
        }
        if self.data_key() == self.timestamp_key() {
            return Err(crate::Error::config(format!(
                "{}: data and timestamp storage keys must differ",
                self.name
            )));
        }
        Ok(())
    }

    /// Time-to-live as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Retry interval as a duration
    pub fn time_to_retry(&self) -> Duration {
        Duration::from_millis(self.time_to_retry_ms)
    }

    /// Resolved data storage key
    pub fn data_key(&self) -> String {
        self.data_storage_key
            .clone()
            .unwrap_or_else(|| format!("{}Data", self.name))
    }

    /// Resolved timestamp storage key
    pub fn timestamp_key(&self) -> String {
        self.timestamp_storage_key
            .clone()
            .unwrap_or_else(|| format!("{}Timestamp", self.name))
    }
}

fn default_ttl_ms() -> u64 {
    DEFAULT_TTL_MS
}

fn default_time_to_retry_ms() -> u64 {
    DEFAULT_TIME_TO_RETRY_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_name() {
        let config = SourceConfig::new("activeCalls");
        assert_eq!(config.ttl_ms, 1_800_000);
        assert_eq!(config.time_to_retry_ms, 62_000);
        assert!(!config.polling);
        assert_eq!(config.data_key(), "activeCallsData");
        assert_eq!(config.timestamp_key(), "activeCallsTimestamp");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_name_is_rejected() {
        let err = SourceConfig::new("  ").validate().unwrap_err();
        assert_eq!(err, crate::Error::config("name must be defined"));
    }

    #[test]
    fn colliding_keys_are_rejected() {
        let config = SourceConfig::new("presence")
            .with_data_storage_key("shared")
            .with_timestamp_storage_key("shared");
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: SourceConfig =
            serde_json::from_str(r#"{ "name": "presence", "polling": true }"#).unwrap();
        assert_eq!(config.ttl(), Duration::from_millis(DEFAULT_TTL_MS));
        assert!(config.polling);
        assert!(config.subscription_filters.is_empty());
    }
}
