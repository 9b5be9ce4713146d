//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing or
//! malformed. The store URL may carry a password, so it is kept as a
//! `SecretString`.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::{Error, Result};

pub const DEFAULT_LEASE_SECONDS: i64 = 60;
pub const DEFAULT_REAPER_INTERVAL_SECONDS: u64 = 5;

#[derive(Debug)]
pub struct Config {
    pub redis_url: SecretString,
    /// Namespace prefix; `None` means generate one.
    pub queue_prefix: Option<String>,
    pub lease_seconds: i64,
    pub reaper_interval: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let lease_seconds = parsed_var("QUEUE_LEASE_SECONDS", DEFAULT_LEASE_SECONDS)?;
        if lease_seconds <= 0 {
            return Err(Error::Config(format!(
                "QUEUE_LEASE_SECONDS must be positive, got {lease_seconds}"
            )));
        }
        let reaper_secs: u64 =
            parsed_var("REAPER_INTERVAL_SECONDS", DEFAULT_REAPER_INTERVAL_SECONDS)?;
        if reaper_secs == 0 {
            return Err(Error::Config(
                "REAPER_INTERVAL_SECONDS must be positive".to_string(),
            ));
        }

        Ok(Self {
            redis_url: SecretString::from(required_var("REDIS_URL")?),
            queue_prefix: std::env::var("QUEUE_PREFIX").ok().filter(|p| !p.is_empty()),
            lease_seconds,
            reaper_interval: Duration::from_secs(reaper_secs),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(default),
    }
}
