//! Configuration module for sitewatch.
//!
//! Built from defaults, optionally overridden by environment variables.

use std::env;
use std::time::Duration;

use thiserror::Error;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Configuration error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Timeout for HTTP requests and TLS handshakes (default: 60s)
    pub client_timeout: Duration,
    /// Number of results the sink buffers before senders wait (default: 100)
    pub sink_capacity: usize,
    /// How long a probe waits on a full sink before dropping its result (default: 5s)
    pub send_timeout: Duration,
    /// Certificates expiring within this window produce a warning (default: 30 days)
    pub expiry_warning: Duration,
    /// Validate the certificate chain against the system trust store (default: false)
    pub verify_chain_of_trust: bool,
    /// Idle connections kept per host in the HTTP pool (default: 100)
    pub pool_max_idle_per_host: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            client_timeout: Duration::from_secs(60),
            sink_capacity: 100,
            send_timeout: Duration::from_secs(5),
            expiry_warning: Duration::from_secs(30 * SECS_PER_DAY),
            verify_chain_of_trust: false,
            pool_max_idle_per_host: 100,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SITEWATCH_CLIENT_TIMEOUT_SECS`: request timeout (default: 60)
    /// - `SITEWATCH_SINK_CAPACITY`: result buffer size (default: 100)
    /// - `SITEWATCH_SEND_TIMEOUT_SECS`: wait on a full sink (default: 5)
    /// - `SITEWATCH_EXPIRY_WARNING_DAYS`: certificate warning window (default: 30)
    /// - `SITEWATCH_VERIFY_CHAIN`: `true`/`1` to enforce CA trust (default: false)
    ///
    /// Unparseable values are ignored with a warning.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Some(secs) = parse_env::<u64>("SITEWATCH_CLIENT_TIMEOUT_SECS") {
            cfg.client_timeout = Duration::from_secs(secs);
        }

        if let Some(capacity) = parse_env::<usize>("SITEWATCH_SINK_CAPACITY") {
            cfg.sink_capacity = capacity;
        }

        if let Some(secs) = parse_env::<u64>("SITEWATCH_SEND_TIMEOUT_SECS") {
            cfg.send_timeout = Duration::from_secs(secs);
        }

        if let Some(days) = parse_env::<u64>("SITEWATCH_EXPIRY_WARNING_DAYS") {
            match days_to_duration(days) {
                Some(window) => cfg.expiry_warning = window,
                None => tracing::warn!(
                    "Ignoring invalid value for SITEWATCH_EXPIRY_WARNING_DAYS: {} is too large",
                    days
                ),
            }
        }

        if let Ok(value) = env::var("SITEWATCH_VERIFY_CHAIN") {
            cfg.verify_chain_of_trust = matches!(value.trim(), "1" | "true" | "yes");
        }

        cfg
    }

    /// Reject settings that would stall the monitor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_timeout.is_zero() {
            return Err(ConfigError::Zero("client_timeout"));
        }
        if self.sink_capacity == 0 {
            return Err(ConfigError::Zero("sink_capacity"));
        }
        if self.send_timeout.is_zero() {
            return Err(ConfigError::Zero("send_timeout"));
        }
        Ok(())
    }
}

fn days_to_duration(days: u64) -> Option<Duration> {
    days.checked_mul(SECS_PER_DAY).map(Duration::from_secs)
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}
