//! Worker configuration.
//!
//! Read from the environment with typed defaults:
//!
//! | variable                       | default          |
//! |--------------------------------|------------------|
//! | `YAPPLR_WORKER_NAME`           | `command-worker` |
//! | `YAPPLR_WORKER_MAX_CONCURRENT` | `4`              |
//! | `YAPPLR_MAX_DELIVERY_ATTEMPTS` | `5`              |
//! | `YAPPLR_REDELIVERY_DELAY_MS`   | `500`            |

use std::str::FromStr;
use std::time::Duration;

use yapplr_commands::InMemoryBrokerConfig;

pub const WORKER_NAME: &str = "YAPPLR_WORKER_NAME";
pub const WORKER_MAX_CONCURRENT: &str = "YAPPLR_WORKER_MAX_CONCURRENT";
pub const MAX_DELIVERY_ATTEMPTS: &str = "YAPPLR_MAX_DELIVERY_ATTEMPTS";
pub const REDELIVERY_DELAY_MS: &str = "YAPPLR_REDELIVERY_DELAY_MS";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Command worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Name for logging
    pub name: String,
    /// Deliveries handled at the same time
    pub max_concurrent: usize,
    /// Delivery attempts before a failing command is dead-lettered
    pub max_delivery_attempts: u32,
    /// Backoff before the first redelivery
    pub redelivery_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "command-worker".to_string(),
            max_concurrent: 4,
            max_delivery_attempts: 5,
            redelivery_delay: Duration::from_millis(500),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(WORKER_NAME).filter(|n| !n.trim().is_empty()) {
            config.name = name;
        }
        if let Some(raw) = lookup(WORKER_MAX_CONCURRENT) {
            config.max_concurrent = parse_positive(WORKER_MAX_CONCURRENT, &raw)?;
        }
        if let Some(raw) = lookup(MAX_DELIVERY_ATTEMPTS) {
            config.max_delivery_attempts = parse_positive(MAX_DELIVERY_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = lookup(REDELIVERY_DELAY_MS) {
            config.redelivery_delay = Duration::from_millis(parse(REDELIVERY_DELAY_MS, &raw)?);
        }

        Ok(config)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_delivery_attempts = attempts;
        self
    }

    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }

    /// Redelivery policy for an in-memory broker paired with this worker.
    pub fn broker_config(&self) -> InMemoryBrokerConfig {
        InMemoryBrokerConfig::default()
            .with_max_delivery_attempts(self.max_delivery_attempts)
            .with_redelivery_delay(self.redelivery_delay)
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_positive<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let value: T = parse(key, raw)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
