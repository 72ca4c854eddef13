//! Configuration for the StreamableHTTP transport.

use std::time::Duration;

/// Which shape the server uses to answer a POST carrying a request id.
/// Selected once at server construction as a per-deployment config choice,
/// not a per-request negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Open a per-request SSE stream; close it immediately after the
    /// terminal response. This is the MCP 2025-03-26 default.
    Sse,
    /// Block the HTTP response until the handler completes.
    JsonSync,
    /// Reply `202 Accepted` with a `Location` header the client polls.
    JsonAsync,
}

/// Configuration for the StreamableHTTP transport.
#[derive(Debug, Clone)]
pub struct StreamableHttpConfig {
    /// Path the single MCP endpoint is served at (default `/mcp`).
    pub endpoint_path: String,
    /// Response shape for requests carrying an id.
    pub response_mode: ResponseMode,
    /// Whether `GET <endpoint>` opens a standalone SSE stream.
    pub enable_get_stream: bool,
    /// Timeout for reading the request body and for JSON-sync completion.
    pub request_timeout: Duration,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
    /// Per-session replay buffer size for `Last-Event-ID` resumability.
    pub replay_buffer_size: usize,
    /// How long a completed JSON-async response is retained before GC if
    /// the client never polls for it.
    pub json_async_gc_after: Duration,
    /// SSE keepalive comment interval on the standalone GET stream.
    pub keep_alive: Duration,
}

impl Default for StreamableHttpConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/mcp".to_string(),
            response_mode: ResponseMode::Sse,
            enable_get_stream: true,
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 4 * 1024 * 1024,
            replay_buffer_size: 1000,
            json_async_gc_after: Duration::from_secs(300),
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// Builder for [`StreamableHttpConfig`], following the chained-`Self`
/// convention used throughout this workspace's config types.
#[derive(Debug, Clone, Default)]
pub struct StreamableHttpConfigBuilder {
    config: StreamableHttpConfig,
}

impl StreamableHttpConfigBuilder {
    /// Start from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint path (default `/mcp`).
    #[must_use]
    pub fn endpoint_path(mut self, path: impl Into<String>) -> Self {
        self.config.endpoint_path = path.into();
        self
    }

    /// Set the response mode for requests carrying an id.
    #[must_use]
    pub fn response_mode(mut self, mode: ResponseMode) -> Self {
        self.config.response_mode = mode;
        self
    }

    /// Enable or disable the standalone GET SSE stream.
    #[must_use]
    pub fn enable_get_stream(mut self, enabled: bool) -> Self {
        self.config.enable_get_stream = enabled;
        self
    }

    /// Set the request/JSON-sync timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the maximum accepted request body size.
    #[must_use]
    pub fn max_body_bytes(mut self, max: usize) -> Self {
        self.config.max_body_bytes = max;
        self
    }

    /// Set the per-session SSE replay buffer size.
    #[must_use]
    pub fn replay_buffer_size(mut self, size: usize) -> Self {
        self.config.replay_buffer_size = size;
        self
    }

    /// Build the immutable configuration.
    #[must_use]
    pub fn build(self) -> StreamableHttpConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = StreamableHttpConfig::default();
        assert_eq!(config.endpoint_path, "/mcp");
        assert!(config.enable_get_stream);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(matches!(config.response_mode, ResponseMode::Sse));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = StreamableHttpConfigBuilder::new()
            .endpoint_path("/api/mcp")
            .response_mode(ResponseMode::JsonSync)
            .enable_get_stream(false)
            .build();
        assert_eq!(config.endpoint_path, "/api/mcp");
        assert!(matches!(config.response_mode, ResponseMode::JsonSync));
        assert!(!config.enable_get_stream);
    }
}
