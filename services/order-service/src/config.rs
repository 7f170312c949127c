//! Order service configuration.
//!
//! Loaded from environment variables with defaults; `main` reads `.env`
//! first through `dotenvy`.

use std::time::Duration;
use stockflow_amqp::config::{parse_or, process_env, string_or};
use stockflow_amqp::{BrokerConfig, ConfigError};
use stockflow_runtime::{CircuitBreakerConfig, RetryPolicy};

/// Order service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Broker settings
    pub broker: BrokerConfig,
    /// Stock validation client settings
    pub stock: StockClientConfig,
    /// Host to bind to (`HOST`)
    pub host: String,
    /// Port to bind to (`PORT`)
    pub port: u16,
}

impl Config {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    /// Load through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            broker: BrokerConfig::from_lookup(lookup)?,
            stock: StockClientConfig::from_lookup(lookup)?,
            host: string_or(lookup, "HOST", "0.0.0.0"),
            port: parse_or(lookup, "PORT", 5002)?,
        })
    }

    /// `host:port` to bind the HTTP listener on.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resilience settings for the stock validation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockClientConfig {
    /// Stock service base URL (`STOCK_SERVICE_URL`)
    pub base_url: String,
    /// Per-attempt timeout (`STOCK_CLIENT_TIMEOUT_MS`)
    pub timeout: Duration,
    /// Retries after the first attempt on transient faults (`STOCK_CLIENT_MAX_RETRIES`)
    pub max_retries: usize,
    /// Wait before the first retry; doubles per retry (`STOCK_CLIENT_RETRY_DELAY_MS`)
    pub retry_delay: Duration,
    /// Consecutive failed calls that open the breaker (`STOCK_BREAKER_FAILURES`)
    pub breaker_failures: usize,
    /// How long the breaker stays open (`STOCK_BREAKER_OPEN_SECS`)
    pub breaker_open: Duration,
}

impl Default for StockClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5001".to_string(),
            timeout: Duration::from_millis(5000),
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
            breaker_failures: 5,
            breaker_open: Duration::from_secs(30),
        }
    }
}

impl StockClientConfig {
    /// Load through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a numeric variable does not parse.
    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            base_url: string_or(lookup, "STOCK_SERVICE_URL", &defaults.base_url),
            timeout: Duration::from_millis(parse_or(lookup, "STOCK_CLIENT_TIMEOUT_MS", 5000)?),
            max_retries: parse_or(lookup, "STOCK_CLIENT_MAX_RETRIES", defaults.max_retries)?,
            retry_delay: Duration::from_millis(parse_or(
                lookup,
                "STOCK_CLIENT_RETRY_DELAY_MS",
                200,
            )?),
            breaker_failures: parse_or(
                lookup,
                "STOCK_BREAKER_FAILURES",
                defaults.breaker_failures,
            )?,
            breaker_open: Duration::from_secs(parse_or(lookup, "STOCK_BREAKER_OPEN_SECS", 30)?),
        })
    }

    /// Retry schedule for transient faults.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .initial_delay(self.retry_delay)
            .max_delay(self.retry_delay.saturating_mul(8))
            .multiplier(2.0)
            .build()
    }

    /// Breaker thresholds.
    #[must_use]
    pub const fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .failure_threshold(self.breaker_failures)
            .open_duration(self.breaker_open)
            .build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(&lookup(&[])).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:5002");
        assert_eq!(config.stock, StockClientConfig::default());
    }

    #[test]
    fn stock_client_settings_are_read() {
        let config = Config::from_lookup(&lookup(&[
            ("STOCK_SERVICE_URL", "http://stock:8080"),
            ("STOCK_CLIENT_TIMEOUT_MS", "750"),
            ("STOCK_CLIENT_MAX_RETRIES", "1"),
            ("STOCK_BREAKER_FAILURES", "2"),
        ]))
        .unwrap();

        assert_eq!(config.stock.base_url, "http://stock:8080");
        assert_eq!(config.stock.timeout, Duration::from_millis(750));
        assert_eq!(config.stock.retry_policy().max_attempts(), 2);
        assert_eq!(config.stock.breaker_config().failure_threshold, 2);
    }

    #[test]
    fn unparsable_timeout_is_rejected() {
        let error =
            Config::from_lookup(&lookup(&[("STOCK_CLIENT_TIMEOUT_MS", "soon")])).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { key: "STOCK_CLIENT_TIMEOUT_MS", .. }));
    }
}
