//! Transport-layer error type.

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors raised by a transport implementation, distinct from `McpError`
/// (which is a wire-level JSON-RPC error) because these never reach the
/// client as a JSON-RPC response — they represent local I/O or framing
/// failures the dispatcher reacts to (e.g. by closing a session).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying connection is gone.
    #[error("connection closed")]
    Closed,

    /// Malformed line/frame on the wire (stdio framing, bad SSE chunk, ...).
    #[error("framing error: {0}")]
    Framing(String),

    /// The addressed session, stream, or pending slot no longer exists.
    #[error("unknown routing target: {0}")]
    UnknownTarget(String),

    /// Request body exceeded the configured size cap.
    #[error("request body too large: {size} bytes (limit {limit})")]
    BodyTooLarge {
        /// Observed size
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// I/O failure underlying the transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
