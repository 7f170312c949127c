//! Stock service configuration.
//!
//! Loaded from environment variables with defaults; `main` reads `.env`
//! first through `dotenvy`.

use stockflow_amqp::config::{parse_or, process_env, string_or};
use stockflow_amqp::{BrokerConfig, ConfigError};

/// Stock service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Broker settings
    pub broker: BrokerConfig,
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
            host: string_or(lookup, "HOST", "0.0.0.0"),
            port: parse_or(lookup, "PORT", 5001)?,
        })
    }

    /// `host:port` to bind the HTTP listener on.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(&|_: &str| None).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:5001");
        assert_eq!(config.broker, BrokerConfig::default());
    }

    #[test]
    fn unparsable_port_is_rejected() {
        let lookup = |key: &str| (key == "PORT").then(|| "http".to_string());
        let error = Config::from_lookup(&lookup).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { key: "PORT", .. }));
    }
}
