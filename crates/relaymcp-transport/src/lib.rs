//! Transport-agnostic framing for the relaymcp server runtime: the
//! [`Transport`] trait every concrete transport implements, and three
//! implementations — stdio, legacy SSE (MCP 2024-11-05), and StreamableHTTP
//! (MCP 2025-03-26).

pub mod error;
pub mod oauth;
pub mod security;
pub mod sse_legacy;
pub mod stdio;
pub mod streamable_http;
pub mod traits;

pub use error::{TransportError, TransportResult};
pub use oauth::{
    required_scope, ClientCredentialsValidator, OAuthService, TokenInfo, TokenPair, TokenValidator,
};
pub use security::OriginPolicy;
pub use sse_legacy::LegacySseTransport;
pub use stdio::{StdioTransport, STDIO_SESSION_ID};
pub use streamable_http::{
    ResponseMode, StreamableHttpConfig, StreamableHttpConfigBuilder, StreamableHttpTransport,
};
pub use traits::{InboundEnvelope, Routing, Transport};
