//! Engine configuration
//!
//! Loaded from `SKILLSWAP_*` environment variables, falling back to defaults
//! for anything unset. Session length is not configurable; see
//! [`SESSION_MINUTES`](crate::booking::SESSION_MINUTES).
//!
//! | Variable | Default |
//! |----------|---------|
//! | `SKILLSWAP_STARTING_BALANCE` | 10 |
//! | `SKILLSWAP_OUTCOME_TIMEOUT_MS` | 10000 |
//! | `SKILLSWAP_READ_RETRY_ATTEMPTS` | 3 |
//! | `SKILLSWAP_READ_RETRY_DELAY_MS` | 50 |
//! | `SKILLSWAP_JOURNAL_INTENTS` | true |
//! | `SKILLSWAP_BROADCAST_CAPACITY` | 64 |
//!
//! # Example
//!
//! ```no_run
//! use skillswap_engine::config::EngineConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::from_env()?;
//! println!("New accounts start with {}", config.starting_balance);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use skillswap_core::types::Credits;
use skillswap_runtime::RetryPolicy;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("Invalid value for {var}: {value}")]
    InvalidValue {
        /// Variable name
        var: &'static str,
        /// Raw value
        value: String,
    },

    /// Parsed values do not make sense together
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Runtime settings of the marketplace engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Balance granted to accounts created at first sign-in
    pub starting_balance: Credits,
    /// How long a caller waits for an operation's outcome
    pub outcome_timeout: Duration,
    /// Calls per read, the first included
    pub read_retry_attempts: u32,
    /// Delay after the first failed read
    pub read_retry_delay: Duration,
    /// Record transfer/booking intents when a journal is configured
    pub journal_intents: bool,
    /// Buffered actions per observer of the store
    pub broadcast_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            starting_balance: Credits::new(10),
            outcome_timeout: Duration::from_secs(10),
            read_retry_attempts: 3,
            read_retry_delay: Duration::from_millis(50),
            journal_intents: true,
            broadcast_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed or the result fails
    /// validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed or the result fails
    /// validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            starting_balance: parse(&lookup, "SKILLSWAP_STARTING_BALANCE")?
                .map_or(defaults.starting_balance, Credits::new),
            outcome_timeout: parse(&lookup, "SKILLSWAP_OUTCOME_TIMEOUT_MS")?
                .map_or(defaults.outcome_timeout, Duration::from_millis),
            read_retry_attempts: parse(&lookup, "SKILLSWAP_READ_RETRY_ATTEMPTS")?
                .unwrap_or(defaults.read_retry_attempts),
            read_retry_delay: parse(&lookup, "SKILLSWAP_READ_RETRY_DELAY_MS")?
                .map_or(defaults.read_retry_delay, Duration::from_millis),
            journal_intents: parse_flag(&lookup, "SKILLSWAP_JOURNAL_INTENTS")?
                .unwrap_or(defaults.journal_intents),
            broadcast_capacity: parse(&lookup, "SKILLSWAP_BROADCAST_CAPACITY")?
                .unwrap_or(defaults.broadcast_capacity),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outcome_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "outcome_timeout must be > 0".to_string(),
            ));
        }
        if self.read_retry_attempts == 0 {
            return Err(ConfigError::Validation(
                "read_retry_attempts must be > 0".to_string(),
            ));
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::Validation(
                "broadcast_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Backoff policy for store reads.
    #[must_use]
    pub fn read_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(self.read_retry_attempts)
            .initial_delay(self.read_retry_delay)
            .max_delay(self.read_retry_delay.saturating_mul(16))
            .build()
    }
}

fn parse<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidValue { var, value })
        })
        .transpose()
}

fn parse_flag<F>(lookup: &F, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { var, value }),
        })
        .transpose()
}
