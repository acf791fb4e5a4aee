//! Environment-driven configuration for the worker
//!
//! Configuration is read once at startup. Required variables fail fast;
//! optional ones fall back to documented defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const ENV_REDIS_HOST: &str = "REDIS_HOST";
pub const ENV_REDIS_PORT: &str = "REDIS_PORT";
pub const ENV_REDIS_CHANNEL: &str = "REDIS_CHANNEL";
pub const ENV_HEALTH_PORT: &str = "HEALTH_PORT";
pub const ENV_HEALTH_PROBE_TIMEOUT_MS: &str = "HEALTH_PROBE_TIMEOUT_MS";
pub const ENV_PROCESSING_MAX_DELAY_MS: &str = "PROCESSING_MAX_DELAY_MS";

/// Main worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerConfig {
    pub broker: BrokerSection,
    #[serde(default)]
    pub health: HealthSection,
    #[serde(default)]
    pub processing: ProcessingSection,
}

/// Broker section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker host name or address
    pub host: String,
    /// Broker TCP port
    pub port: u16,
    /// Channel to subscribe to
    pub channel: String,
}

/// Health server section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    /// Port bound on all interfaces (default: 8080)
    #[serde(default = "default_health_port")]
    pub port: u16,
    /// Upper bound on a single broker probe in milliseconds (default: 2000)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl HealthSection {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            port: default_health_port(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

/// Message processing section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingSection {
    /// Exclusive upper bound of the simulated delay in milliseconds (default: 2000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ProcessingSection {
    fn default() -> Self {
        Self {
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_health_port() -> u16 {
    8080
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    2000
}

/// Configuration loading errors
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
}

impl WorkerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = get_required(&lookup, ENV_REDIS_HOST)?;
        let port = parse_port(ENV_REDIS_PORT, &get_required(&lookup, ENV_REDIS_PORT)?)?;
        let channel = get_required(&lookup, ENV_REDIS_CHANNEL)?;

        let health_port = match lookup(ENV_HEALTH_PORT) {
            Some(value) => parse_port(ENV_HEALTH_PORT, &value)?,
            None => default_health_port(),
        };
        let probe_timeout_ms = match lookup(ENV_HEALTH_PROBE_TIMEOUT_MS) {
            Some(value) => parse_millis(ENV_HEALTH_PROBE_TIMEOUT_MS, &value)?,
            None => default_probe_timeout_ms(),
        };
        if probe_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: ENV_HEALTH_PROBE_TIMEOUT_MS.to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        let max_delay_ms = match lookup(ENV_PROCESSING_MAX_DELAY_MS) {
            Some(value) => parse_millis(ENV_PROCESSING_MAX_DELAY_MS, &value)?,
            None => default_max_delay_ms(),
        };

        Ok(Self {
            broker: BrokerSection {
                host,
                port,
                channel,
            },
            health: HealthSection {
                port: health_port,
                probe_timeout_ms,
            },
            processing: ProcessingSection { max_delay_ms },
        })
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            broker: BrokerSection {
                host: "localhost".to_string(),
                port: 6379,
                channel: "log_channel".to_string(),
            },
            health: HealthSection::default(),
            processing: ProcessingSection { max_delay_ms: 5 },
        }
    }
}

fn get_required<F>(lookup: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::EnvVarNotFound(name.to_string())),
    }
}

fn parse_port(name: &str, value: &str) -> Result<u16, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    match value.trim().parse::<u16>() {
        Ok(0) => Err(invalid("port must be non-zero")),
        Ok(port) => Ok(port),
        Err(e) => Err(invalid(&e.to_string())),
    }
}

fn parse_millis(name: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}
