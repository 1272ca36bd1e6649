//! Configuration management for the lending service.
//!
//! Loads configuration from environment variables; the binary reads a
//! `.env` file first when one is present.

use crate::policy::LendingPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration value out of range
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting that must be positive is zero
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Application configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Lending rules
    pub policy: LendingPolicy,
    /// Background overdue sweep
    pub sweeper: SweeperConfig,
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
}

/// Background overdue sweep configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between sweeps, 0 disables the sweeper
    pub interval_secs: u64,
}

impl SweeperConfig {
    /// Time between sweeps, `None` when disabled
    #[must_use]
    pub const fn interval(&self) -> Option<Duration> {
        if self.interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.interval_secs))
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: LendingPolicy::default(),
            sweeper: SweeperConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LendingPolicy::default();
        Self {
            policy: LendingPolicy {
                loan_period_days: lookup("LENDING_LOAN_PERIOD_DAYS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.loan_period_days),
                extension_days: lookup("LENDING_EXTENSION_DAYS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.extension_days),
                user_borrow_limit: lookup("LENDING_USER_BORROW_LIMIT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.user_borrow_limit),
                max_extensions: lookup("LENDING_MAX_EXTENSIONS").and_then(|s| s.parse().ok()),
            },
            sweeper: SweeperConfig {
                interval_secs: lookup("LENDING_SWEEP_INTERVAL_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(SweeperConfig::default().interval_secs),
            },
            log_level: lookup("LENDING_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        }
    }

    /// Reject settings the engine cannot work with
    ///
    /// # Errors
    ///
    /// [`ConfigError::Zero`] for a zero loan period or extension length.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.policy.loan_period_days == 0 {
            return Err(ConfigError::Zero("LENDING_LOAN_PERIOD_DAYS"));
        }
        if self.policy.extension_days == 0 {
            return Err(ConfigError::Zero("LENDING_EXTENSION_DAYS"));
        }
        Ok(())
    }
}
