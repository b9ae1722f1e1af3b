//! Application configuration.
//!
//! # Environment Variables
//!
//! - `HOST`: Server host address (default: `0.0.0.0`)
//! - `PORT`: Server port (default: `3000`)
//! - `IDEMPOTENCY_WINDOW_SECS`: Lifetime of a cached result (default: `60`)
//! - `IDEMPOTENCY_TIMEOUT_MS`: Per-operation timeout (default: `30000`)
//! - `IDEMPOTENCY_SWEEP_INTERVAL_SECS`: Eviction sweep period (default: `30`)
//! - `IDEMPOTENCY_PROCESSING_DELAY_MS`: Simulated work in `POST /idempotency`
//!   (default: `1000`)
//! - `ISSUE_UPDATE_DELAY_MS`: Simulated gap between read and write in
//!   `PUT /issues/{id}` (default: `100`)
//!
//! `WORKER_THREADS` is read by the binary before the runtime exists and is
//! not part of [`AppConfig`].
//!
//! # Example
//!
//! ```ignore
//! let config = AppConfig::from_env()?;
//! let address = config.server.socket_addr()?;
//! ```

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::coordination::IdempotencyConfig;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_PROCESSING_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_UPDATE_DELAY: Duration = Duration::from_millis(100);

// =============================================================================
// Configuration Types
// =============================================================================

/// Address the HTTP server binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Parses `host:port` into a socket address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidAddress` if the host is not an IP
    /// address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigurationError> {
        let address = format!("{}:{}", self.host, self.port);
        address
            .parse()
            .map_err(|_| ConfigurationError::InvalidAddress(address))
    }
}

/// Runtime settings for the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Window and timeout of the idempotency coordinator.
    pub idempotency: IdempotencyConfig,
    /// Period of the background sweep that evicts expired entries.
    pub sweep_interval: Duration,
    /// Simulated processing time of an idempotent request.
    pub processing_delay: Duration,
    /// Simulated gap between reading and writing an issue.
    pub update_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            idempotency: IdempotencyConfig::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            processing_delay: DEFAULT_PROCESSING_DELAY,
            update_delay: DEFAULT_UPDATE_DELAY,
        }
    }
}

impl AppConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Creates a configuration from environment variables.
    ///
    /// Unset or whitespace-only variables fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a variable is not a valid number, a
    /// duration that must be positive is zero, or the address is invalid.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Creates a configuration reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut builder = Self::builder();

        if let Some(host) = read("HOST") {
            builder = builder.host(host);
        }
        if let Some(port) = parse_variable::<u16>("PORT", read("PORT"))? {
            builder = builder.port(port);
        }
        if let Some(seconds) = parse_variable("IDEMPOTENCY_WINDOW_SECS", read("IDEMPOTENCY_WINDOW_SECS"))? {
            builder = builder.idempotency_window(Duration::from_secs(seconds));
        }
        if let Some(millis) = parse_variable("IDEMPOTENCY_TIMEOUT_MS", read("IDEMPOTENCY_TIMEOUT_MS"))? {
            builder = builder.operation_timeout(Duration::from_millis(millis));
        }
        if let Some(seconds) = parse_variable(
            "IDEMPOTENCY_SWEEP_INTERVAL_SECS",
            read("IDEMPOTENCY_SWEEP_INTERVAL_SECS"),
        )? {
            builder = builder.sweep_interval(Duration::from_secs(seconds));
        }
        if let Some(millis) = parse_variable(
            "IDEMPOTENCY_PROCESSING_DELAY_MS",
            read("IDEMPOTENCY_PROCESSING_DELAY_MS"),
        )? {
            builder = builder.processing_delay(Duration::from_millis(millis));
        }
        if let Some(millis) = parse_variable("ISSUE_UPDATE_DELAY_MS", read("ISSUE_UPDATE_DELAY_MS"))? {
            builder = builder.update_delay(Duration::from_millis(millis));
        }

        builder.build()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::MustBePositive` for a zero window,
    /// timeout or sweep interval, `ConfigurationError::DelayExceedsTimeout`
    /// when the simulated processing delay cannot finish inside the operation
    /// timeout, and `ConfigurationError::InvalidAddress` for an unparsable
    /// bind address.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.idempotency.window.is_zero() {
            return Err(ConfigurationError::MustBePositive("IDEMPOTENCY_WINDOW_SECS"));
        }
        if self
            .idempotency
            .operation_timeout
            .is_some_and(|timeout| timeout.is_zero())
        {
            return Err(ConfigurationError::MustBePositive("IDEMPOTENCY_TIMEOUT_MS"));
        }
        if let Some(timeout) = self.idempotency.operation_timeout
            && self.processing_delay >= timeout
        {
            return Err(ConfigurationError::DelayExceedsTimeout {
                delay: self.processing_delay,
                timeout,
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigurationError::MustBePositive(
                "IDEMPOTENCY_SWEEP_INTERVAL_SECS",
            ));
        }
        self.server.socket_addr()?;
        Ok(())
    }
}

fn parse_variable<T: FromStr>(
    name: &'static str,
    value: Option<String>,
) -> Result<Option<T>, ConfigurationError> {
    value
        .map(|raw| {
            raw.parse().map_err(|_| ConfigurationError::InvalidNumber {
                variable: name,
                value: raw,
            })
        })
        .transpose()
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for `AppConfig`.
///
/// # Example
///
/// ```ignore
/// let config = AppConfig::builder()
///     .port(8080)
///     .processing_delay(Duration::ZERO)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    #[must_use]
    pub const fn idempotency_window(mut self, window: Duration) -> Self {
        self.config.idempotency.window = window;
        self
    }

    #[must_use]
    pub const fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.idempotency.operation_timeout = Some(timeout);
        self
    }

    /// Lets idempotent operations run without a time limit.
    #[must_use]
    pub const fn without_operation_timeout(mut self) -> Self {
        self.config.idempotency.operation_timeout = None;
        self
    }

    #[must_use]
    pub const fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    #[must_use]
    pub const fn processing_delay(mut self, delay: Duration) -> Self {
        self.config.processing_delay = delay;
        self
    }

    #[must_use]
    pub const fn update_delay(mut self, delay: Duration) -> Self {
        self.config.update_delay = delay;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if the configuration is invalid.
    pub fn build(self) -> Result<AppConfig, ConfigurationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while loading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A numeric variable could not be parsed.
    #[error("{variable} must be a non-negative integer, got '{value}'")]
    InvalidNumber { variable: &'static str, value: String },

    /// A duration that must be positive was zero.
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),

    /// Every processed request would time out.
    #[error(
        "IDEMPOTENCY_PROCESSING_DELAY_MS ({delay:?}) must be shorter than IDEMPOTENCY_TIMEOUT_MS ({timeout:?})"
    )]
    DelayExceedsTimeout { delay: Duration, timeout: Duration },

    /// The bind address could not be parsed.
    #[error("Invalid server address: '{0}'")]
    InvalidAddress(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let variables: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect();
        move |name| variables.get(name).cloned()
    }

    #[rstest]
    fn defaults_match_documented_values() {
        let config = AppConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.idempotency.window, Duration::from_secs(60));
        assert_eq!(
            config.idempotency.operation_timeout,
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.processing_delay, Duration::from_secs(1));
        assert_eq!(config.update_delay, Duration::from_millis(100));
    }

    #[rstest]
    fn reads_every_variable() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("IDEMPOTENCY_WINDOW_SECS", "5"),
            ("IDEMPOTENCY_TIMEOUT_MS", "250"),
            ("IDEMPOTENCY_SWEEP_INTERVAL_SECS", "2"),
            ("IDEMPOTENCY_PROCESSING_DELAY_MS", "0"),
            ("ISSUE_UPDATE_DELAY_MS", "10"),
        ]))
        .unwrap();

        assert_eq!(
            config.server.socket_addr().unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.idempotency.window, Duration::from_secs(5));
        assert_eq!(
            config.idempotency.operation_timeout,
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.sweep_interval, Duration::from_secs(2));
        assert_eq!(config.processing_delay, Duration::ZERO);
        assert_eq!(config.update_delay, Duration::from_millis(10));
    }

    #[rstest]
    fn blank_values_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[("PORT", "  "), ("HOST", "")])).unwrap();
        assert_eq!(config.server, ServerConfig::default());
    }

    #[rstest]
    #[case("PORT", "eighty")]
    #[case("PORT", "70000")]
    #[case("IDEMPOTENCY_WINDOW_SECS", "-1")]
    #[case("ISSUE_UPDATE_DELAY_MS", "1.5")]
    fn invalid_numbers_are_rejected(#[case] name: &'static str, #[case] value: &str) {
        let result = AppConfig::from_lookup(lookup_from(&[(name, value)]));
        assert_eq!(
            result.unwrap_err(),
            ConfigurationError::InvalidNumber {
                variable: name,
                value: value.to_string(),
            }
        );
    }

    #[rstest]
    #[case("IDEMPOTENCY_WINDOW_SECS")]
    #[case("IDEMPOTENCY_TIMEOUT_MS")]
    #[case("IDEMPOTENCY_SWEEP_INTERVAL_SECS")]
    fn zero_durations_are_rejected(#[case] name: &'static str) {
        let result = AppConfig::from_lookup(lookup_from(&[(name, "0")]));
        assert_eq!(result.unwrap_err(), ConfigurationError::MustBePositive(name));
    }

    #[rstest]
    #[case("500", "500")]
    #[case("2000", "500")]
    fn processing_delay_must_fit_in_timeout(#[case] delay: &str, #[case] timeout: &str) {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("IDEMPOTENCY_PROCESSING_DELAY_MS", delay),
            ("IDEMPOTENCY_TIMEOUT_MS", timeout),
        ]));

        assert!(matches!(
            result.unwrap_err(),
            ConfigurationError::DelayExceedsTimeout { .. }
        ));
    }

    #[rstest]
    fn invalid_host_is_rejected() {
        let result = AppConfig::builder().host("not a host").build();
        assert_eq!(
            result.unwrap_err(),
            ConfigurationError::InvalidAddress("not a host:3000".to_string())
        );
    }

    #[rstest]
    fn builder_can_disable_timeout() {
        let config = AppConfig::builder()
            .without_operation_timeout()
            .processing_delay(Duration::ZERO)
            .build()
            .unwrap();

        assert!(config.idempotency.operation_timeout.is_none());
        assert_eq!(config.processing_delay, Duration::ZERO);
    }
}
