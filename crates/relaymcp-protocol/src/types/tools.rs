//! Tool descriptor and call result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Immutable tool descriptor advertised by `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name, used as the registry key
    pub name: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing the `arguments` object
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// A single content block in a tool/prompt result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text content
    Text {
        /// Text payload
        text: String,
    },
    /// Base64-encoded image content
    Image {
        /// Base64 image data
        data: String,
        /// MIME type, e.g. `image/png`
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Result of a `tools/call` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Result content blocks
    pub content: Vec<Content>,
    /// Set by the tool itself to signal a handled (non-protocol) failure
    #[serde(default, rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Build a successful text-only result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Build a tool-level error result (`isError: true`), distinct from a
    /// JSON-RPC protocol error: the call itself succeeded, but the tool
    /// reports its own failure.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: true,
        }
    }
}
