//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The database URL is wrapped in `SecretString` so it never
//! reaches a log line.

use crate::error::{Error, Result};
use crate::stress::oracle::DEFAULT_TIMEOUT;
use secrecy::SecretString;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    /// `None` means no oracle: every prediction uses the heuristic.
    pub oracle: Option<OracleConfig>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleConfig {
    pub url: String,
    pub timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            oracle: oracle_from_env()?,
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn oracle_from_env() -> Result<Option<OracleConfig>> {
    let Some(url) = optional_var("STRESS_ORACLE_URL") else {
        return Ok(None);
    };
    let timeout = match optional_var("STRESS_ORACLE_TIMEOUT_MS") {
        Some(raw) => match raw.parse::<u64>() {
            Ok(ms) if ms > 0 && Duration::from_millis(ms) <= DEFAULT_TIMEOUT => {
                Duration::from_millis(ms)
            }
            _ => {
                return Err(Error::Config(format!(
                    "STRESS_ORACLE_TIMEOUT_MS must be between 1 and {}, got {raw:?}",
                    DEFAULT_TIMEOUT.as_millis()
                )));
            }
        },
        None => DEFAULT_TIMEOUT,
    };
    Ok(Some(OracleConfig { url, timeout }))
}

/// Unset and empty are the same thing.
fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}
