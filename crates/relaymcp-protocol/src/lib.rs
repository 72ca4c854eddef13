//! # relaymcp-protocol
//!
//! Wire-level types for the Model Context Protocol: the JSON-RPC 2.0
//! envelope, MCP domain types (tools, resources, prompts, roots,
//! capabilities), the `McpError`/`ErrorKind` taxonomy, and protocol version
//! negotiation.
//!
//! This crate has no knowledge of sessions, transports, or handler
//! dispatch — those live in `relaymcp-transport` and `relaymcp-server`.

pub mod error;
pub mod jsonrpc;
pub mod types;
pub mod version;

pub use error::{ErrorKind, McpError, Result};
pub use types::RequestId;
