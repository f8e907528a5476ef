//! Gateway configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Configuration for a gateway bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// How long a request waits for its event, in milliseconds.
    pub request_timeout_ms: u64,

    /// How long shutdown waits for the dispatch loop, in milliseconds.
    pub shutdown_grace_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Create configuration from environment variables.
    ///
    /// Reads the following environment variables, falling back to the
    /// defaults when unset or unparsable:
    /// - `TOYFACTORY_REQUEST_TIMEOUT_MS`: Request timeout in milliseconds
    /// - `TOYFACTORY_SHUTDOWN_GRACE_MS`: Dispatch shutdown grace in milliseconds
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let request_timeout_ms = env::var("TOYFACTORY_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.request_timeout_ms);

        let shutdown_grace_ms = env::var("TOYFACTORY_SHUTDOWN_GRACE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.shutdown_grace_ms);

        Self {
            request_timeout_ms,
            shutdown_grace_ms,
        }
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Shutdown grace as a duration.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be > 0".to_string());
        }

        Ok(())
    }
}

/// Builder for GatewayConfig.
#[derive(Debug, Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Set the request timeout.
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    /// Set the shutdown grace period.
    pub fn shutdown_grace_ms(mut self, ms: u64) -> Self {
        self.config.shutdown_grace_ms = ms;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<GatewayConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = GatewayConfig::builder()
            .request_timeout_ms(0)
            .build()
            .unwrap_err();
        assert!(err.contains("request_timeout_ms"));
    }
}
