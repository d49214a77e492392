//! Orchestrator configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration of the sync layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Conflict retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Migration options.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl SyncConfig {
    /// Load config from a file; `.json` files are read as JSON, anything else
    /// as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Conflict retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before each retry.
    #[serde(default)]
    pub backoff: Backoff,
}

impl RetryConfig {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            backoff: Backoff::None,
        }
    }

    /// Check if another retry is allowed after `attempt` retries.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    /// No delay between retries.
    None,
    /// Fixed delay between retries.
    Fixed { delay_ms: u64 },
    /// Exponential backoff with base and max.
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Backoff {
    /// Calculate delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Self::Exponential { base_ms, max_ms } => {
                let multiplier = 2u64.saturating_pow(attempt);
                Duration::from_millis(base_ms.saturating_mul(multiplier).min(max_ms))
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base_ms: 50,
            max_ms: 500,
        }
    }
}

/// What a migration carries onto the clone besides its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default = "default_true")]
    pub carry_discount_codes: bool,

    #[serde(default = "default_true")]
    pub carry_custom_fields: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            carry_discount_codes: true,
            carry_custom_fields: true,
        }
    }
}

fn default_true() -> bool {
    true
}
