//! Server configuration: typed fields for everything the dispatcher and
//! cross-cutting concerns need, plus a chained-`Self` builder and an
//! env/file loader built on the `config` crate (teacher convention — see
//! `turbomcp-server::config`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Immutable, fully-resolved server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name reported in `initialize`'s `serverInfo`.
    pub name: String,
    /// Server version reported in `initialize`'s `serverInfo`.
    pub version: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Default TTL for cached resource reads.
    #[serde(with = "humantime_secs")]
    pub resource_cache_ttl: Duration,
    /// Default rate limit: requests allowed per window, per `(session, method)`.
    pub rate_limit_requests: u32,
    /// Rate limit window.
    #[serde(with = "humantime_secs")]
    pub rate_limit_window: Duration,
    /// Whether rate limiting is enabled at all.
    pub rate_limit_enabled: bool,
    /// Whether bearer-token auth is required for non-`initialize` methods.
    pub require_auth: bool,
    /// Timeout awaiting a client's `sampling/response`.
    #[serde(with = "humantime_secs")]
    pub sampling_timeout: Duration,
    /// Timeout awaiting all members of a batch to complete.
    #[serde(with = "humantime_secs")]
    pub batch_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "relaymcp-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: None,
            resource_cache_ttl: Duration::from_secs(300),
            rate_limit_requests: 100,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_enabled: true,
            require_auth: false,
            sampling_timeout: Duration::from_secs(60),
            batch_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `RELAYMCP_*` environment variables layered
    /// over the defaults via the `config` crate's layered source builder.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let built = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::Environment::with_prefix("RELAYMCP").separator("__"))
            .build()?;
        built.try_deserialize()
    }
}

/// `serde(with = ...)` helper serializing [`Duration`] as whole seconds,
/// matching how the rest of the ambient config surface represents
/// durations for `config`/env loading.
mod humantime_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Chained-`Self` builder for [`ServerConfig`], following the convention
/// used by `StreamableHttpConfigBuilder` in `relaymcp-transport`.
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Start from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the server version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Set the server description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = Some(description.into());
        self
    }

    /// Set the default resource cache TTL.
    #[must_use]
    pub fn resource_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.resource_cache_ttl = ttl;
        self
    }

    /// Set the default rate limit (requests per window).
    #[must_use]
    pub fn rate_limit(mut self, requests: u32, window: Duration) -> Self {
        self.config.rate_limit_requests = requests;
        self.config.rate_limit_window = window;
        self
    }

    /// Enable or disable rate limiting entirely.
    #[must_use]
    pub fn rate_limit_enabled(mut self, enabled: bool) -> Self {
        self.config.rate_limit_enabled = enabled;
        self
    }

    /// Require bearer-token auth for non-`initialize` methods.
    #[must_use]
    pub fn require_auth(mut self, required: bool) -> Self {
        self.config.require_auth = required;
        self
    }

    /// Set the sampling response timeout.
    #[must_use]
    pub fn sampling_timeout(mut self, timeout: Duration) -> Self {
        self.config.sampling_timeout = timeout;
        self
    }

    /// Set the batch completion timeout.
    #[must_use]
    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch_timeout = timeout;
        self
    }

    /// Build the immutable configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = ServerConfig::default();
        assert_eq!(config.rate_limit_requests, 100);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.resource_cache_ttl, Duration::from_secs(300));
        assert!(!config.require_auth);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = ServerConfigBuilder::new()
            .name("demo")
            .rate_limit(10, Duration::from_secs(1))
            .require_auth(true)
            .build();
        assert_eq!(config.name, "demo");
        assert_eq!(config.rate_limit_requests, 10);
        assert!(config.require_auth);
    }
}
