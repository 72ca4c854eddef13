//! Server-level error type. Every fallible operation in this crate returns
//! a [`ServerError`]; the dispatcher is the only place that converts one
//! into a wire-level [`relaymcp_protocol::McpError`], so the conversion
//! lives here as a single `From` impl rather than scattered across
//! handlers.

use relaymcp_protocol::{ErrorKind, McpError};

/// Result alias used across the server crate.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Server-level error classification. Distinct from [`McpError`] because
/// some variants (e.g. [`ServerError::SessionNotFound`]) never reach the
/// wire as-is — the dispatcher decides the externally visible message.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// No session exists for the given id.
    #[error("unknown session: {0}")]
    SessionNotFound(String),

    /// A registry lookup failed.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// A resource lookup (exact or template) failed.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A prompt lookup failed.
    #[error("prompt not found: {0}")]
    PromptNotFound(String),

    /// Attempted to register a name/uri that already exists.
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),

    /// The referenced operation id is unknown or belongs to another session.
    #[error("unknown or unowned operation: {0}")]
    UnknownOperation(String),

    /// The operation was cancelled before the handler produced a result.
    #[error("operation cancelled")]
    Cancelled,

    /// The client does not declare a capability this method requires.
    #[error("client lacks required capability: {0}")]
    CapabilityMissing(String),

    /// The session has not completed `initialize` yet.
    #[error("session not initialized")]
    NotInitialized,

    /// Missing or invalid bearer token.
    #[error("unauthorized")]
    Unauthorized,

    /// Bearer token valid but missing a required scope.
    #[error("insufficient permissions: requires scope '{0}'")]
    InsufficientScope(String),

    /// Rate limit exceeded; carries the number of seconds to wait.
    #[error("rate limited, retry after {retry_after}s")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after: u64,
    },

    /// A registered handler returned an application-level error.
    #[error("handler failed: {0}")]
    Handler(String),

    /// `sampling/createMessage` timed out waiting for the client.
    #[error("sampling request timed out")]
    SamplingTimeout,

    /// The connected client does not support sampling.
    #[error("client does not support sampling")]
    SamplingUnsupported,

    /// Malformed request parameters.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// No handler is registered for this JSON-RPC method.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// A pre-built protocol-level error (e.g. version negotiation failure)
    /// that should reach the wire unchanged rather than be reclassified.
    #[error(transparent)]
    Protocol(McpError),

    /// Anything else, always reported to the wire as a sanitized internal
    /// error (never the original message).
    #[error("internal: {0}")]
    Internal(String),
}

impl From<ServerError> for McpError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::SessionNotFound(msg) => {
                McpError::new(ErrorKind::SessionExpired, format!("unknown session: {msg}"))
            }
            ServerError::ToolNotFound(name) => {
                McpError::new(ErrorKind::ToolNotFound, format!("tool not found: {name}"))
            }
            ServerError::ResourceNotFound(uri) => McpError::new(
                ErrorKind::ResourceNotFound,
                format!("resource not found: {uri}"),
            ),
            ServerError::PromptNotFound(name) => McpError::new(
                ErrorKind::PromptNotFound,
                format!("prompt not found: {name}"),
            ),
            ServerError::DuplicateRegistration(what) => {
                McpError::new(ErrorKind::InvalidParams, format!("already registered: {what}"))
            }
            ServerError::UnknownOperation(id) => {
                McpError::new(ErrorKind::InvalidParams, format!("unknown operation: {id}"))
            }
            ServerError::Cancelled => McpError::cancelled(),
            ServerError::CapabilityMissing(cap) => McpError::new(
                ErrorKind::MethodNotFound,
                format!("capability not enabled: {cap}"),
            ),
            ServerError::NotInitialized => {
                McpError::new(ErrorKind::InvalidRequest, "not initialized")
            }
            ServerError::Unauthorized => {
                McpError::new(ErrorKind::Unauthorized, "missing or invalid bearer token")
            }
            ServerError::InsufficientScope(scope) => McpError::new(
                ErrorKind::InsufficientPermissions,
                format!("missing required scope '{scope}'"),
            ),
            ServerError::RateLimited { retry_after } => McpError::rate_limited(retry_after),
            ServerError::Handler(msg) => McpError::new(ErrorKind::ToolExecutionFailed, msg),
            ServerError::SamplingTimeout => {
                McpError::new(ErrorKind::TransportTimeout, "sampling request timed out")
            }
            ServerError::SamplingUnsupported => McpError::new(
                ErrorKind::MethodNotFound,
                "client does not support sampling",
            ),
            ServerError::InvalidParams(msg) => McpError::new(ErrorKind::InvalidParams, msg),
            ServerError::MethodNotFound(method) => {
                McpError::new(ErrorKind::MethodNotFound, format!("method not found: {method}"))
            }
            ServerError::Protocol(err) => err,
            ServerError::Internal(cause) => McpError::internal_sanitized(cause),
        }
    }
}
