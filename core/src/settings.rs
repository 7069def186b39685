//! File-based configuration via TOML
//!
//! Every field is optional; missing values take the library defaults and
//! zero values are normalized the same way the builders normalize them.
//!
//! ```toml
//! [breaker]
//! max_failures = 5
//! open_timeout_secs = 30.0
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1000
//!
//! [stream]
//! max_age_secs = 1800
//! ```

use crate::circuit::Config;
use crate::retry::RetryPolicy;
use crate::stream::StreamConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub breaker: BreakerSettings,
    pub retry: RetrySettings,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub max_failures: usize,
    pub open_timeout_secs: f64,
    pub max_half_open_requests: usize,
    pub jitter_factor: f64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_failures: 5,
            open_timeout_secs: 30.0,
            max_half_open_requests: 3,
            jitter_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            jitter_factor: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub cleanup_interval_secs: u64,
    pub max_age_secs: u64,
    pub max_events_per_buffer: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 5 * 60,
            max_age_secs: 30 * 60,
            max_events_per_buffer: 10_000,
        }
    }
}

impl Settings {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading resilience configuration");

        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&content)?;

        debug!("Resilience configuration loaded successfully");
        Ok(settings)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Try to load from file, falling back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Self::default();
        }

        match Self::from_file(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load resilience config, using defaults"
                );
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let secs = self.breaker.open_timeout_secs;
        if !secs.is_finite() || secs < 0.0 {
            return Err(SettingsError::Invalid(format!(
                "breaker.open_timeout_secs must be a non-negative number, got {}",
                secs
            )));
        }

        for (field, factor) in [
            ("breaker.jitter_factor", self.breaker.jitter_factor),
            ("retry.jitter_factor", self.retry.jitter_factor),
        ] {
            if !(0.0..=1.0).contains(&factor) {
                return Err(SettingsError::Invalid(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    field, factor
                )));
            }
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(SettingsError::Invalid(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }

        Ok(())
    }

    pub fn breaker_config(&self) -> Config {
        Config {
            max_failures: self.breaker.max_failures,
            open_timeout: Duration::try_from_secs_f64(self.breaker.open_timeout_secs)
                .unwrap_or(Duration::ZERO),
            max_half_open_requests: self.breaker.max_half_open_requests,
            jitter_factor: self.breaker.jitter_factor,
        }
        .normalized()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter_factor: self.retry.jitter_factor,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            cleanup_interval: Duration::from_secs(self.stream.cleanup_interval_secs),
            max_age: Duration::from_secs(self.stream.max_age_secs),
            max_events_per_buffer: self.stream.max_events_per_buffer,
        }
        .normalized()
    }
}
