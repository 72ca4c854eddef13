//! The MCP error taxonomy (`McpError`/`ErrorKind`) and its mapping onto the
//! JSON-RPC and MCP-specific wire error codes, plus the HTTP status each
//! kind maps to at the transport boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result alias used across the protocol crate.
pub type Result<T> = std::result::Result<T, McpError>;

/// Programmatic error classification. Every handler and transport boundary
/// in this workspace produces one of these, never a bare `anyhow::Error`,
/// so that the dispatcher can always recover a JSON-RPC code and HTTP
/// status without string-matching a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // JSON-RPC standard
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,

    // MCP-specific (-321xx)
    ResourceNotFound,
    ToolNotFound,
    PromptNotFound,
    IncompatibleVersion,
    Unauthorized,
    OperationCancelled,
    RateLimited,
    SessionExpired,

    // Auth (-3212x)
    AuthInvalidGrant,
    AuthInvalidClient,
    AuthInvalidScope,
    InsufficientPermissions,

    // Transport (-3213x)
    TransportClosed,
    TransportTimeout,

    // Resource (-3214x)
    ResourceUnavailable,
    StorageError,

    // Tool (-3215x)
    ToolUnavailable,
    ToolExecutionFailed,

    // Server (-3216x)
    ServerOverloaded,
    Configuration,
}

impl ErrorKind {
    /// The JSON-RPC / MCP wire error code for this kind.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::Internal => -32603,

            Self::ResourceNotFound => -32100,
            Self::ToolNotFound => -32101,
            Self::PromptNotFound => -32102,
            Self::IncompatibleVersion => -32103,
            Self::Unauthorized => -32104,
            Self::OperationCancelled => -32105,
            Self::RateLimited => -32106,
            Self::SessionExpired => -32110,

            Self::AuthInvalidGrant => -32120,
            Self::AuthInvalidClient => -32121,
            Self::InsufficientPermissions => -32122,
            Self::AuthInvalidScope => -32123,

            Self::TransportClosed => -32130,
            Self::TransportTimeout => -32131,

            Self::ResourceUnavailable => -32140,
            Self::StorageError => -32141,

            Self::ToolUnavailable => -32150,
            Self::ToolExecutionFailed => -32151,

            Self::ServerOverloaded => -32160,
            Self::Configuration => -32161,
        }
    }

    /// The HTTP status this kind maps to at the StreamableHTTP boundary.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::ParseError | Self::InvalidRequest | Self::InvalidParams => 400,
            Self::Unauthorized => 401,
            Self::InsufficientPermissions | Self::AuthInvalidScope => 403,
            Self::ResourceNotFound
            | Self::ToolNotFound
            | Self::PromptNotFound
            | Self::MethodNotFound
            | Self::SessionExpired => 404,
            Self::RateLimited => 429,
            Self::IncompatibleVersion => 422,
            Self::TransportTimeout => 504,
            Self::ServerOverloaded | Self::ResourceUnavailable | Self::ToolUnavailable => 503,
            Self::AuthInvalidGrant | Self::AuthInvalidClient => 400,
            _ => 500,
        }
    }

    /// Whether callers should retry this class of error.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited
                | Self::TransportTimeout
                | Self::ServerOverloaded
                | Self::ResourceUnavailable
                | Self::ToolUnavailable
                | Self::StorageError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The error type produced by every fallible operation in the protocol and
/// server crates. Carries enough structure for the dispatcher to build a
/// well-formed JSON-RPC error object without re-deriving the code from a
/// message string.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct McpError {
    /// Classification
    pub kind: ErrorKind,
    /// Human-readable message. Never includes a stack trace or internal
    /// path — sanitized at construction time for `Internal`-kind errors.
    pub message: String,
    /// Seconds the caller should wait before retrying, set only on
    /// retryable kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Optional correlation id for cross-system tracing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl McpError {
    /// Construct an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
            trace_id: None,
        }
    }

    /// Attach a retry-after hint (only meaningful on retryable kinds).
    #[must_use]
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Attach a trace id for correlation.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Build an `Internal` error from an opaque cause, sanitizing the
    /// message so no internal detail (stack trace, file path) ever reaches
    /// the wire — the server never reveals internals in `error.message`.
    pub fn internal_sanitized(cause: impl fmt::Display) -> Self {
        tracing::error!(error = %cause, "internal error");
        Self::new(ErrorKind::Internal, "internal server error")
    }

    /// Shorthand for a `-32105 operationCancelled` error.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::OperationCancelled, "operation was cancelled")
    }

    /// Shorthand for a `-32106 rateLimited` error with a retry hint.
    #[must_use]
    pub fn rate_limited(retry_after: u64) -> Self {
        Self::new(ErrorKind::RateLimited, "rate limit exceeded").with_retry_after(retry_after)
    }
}
