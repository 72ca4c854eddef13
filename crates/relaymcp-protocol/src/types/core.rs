//! Core wire types shared across the MCP surface: request identifiers,
//! timestamps, and the implementation/capability descriptors exchanged
//! during `initialize`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// JSON-RPC request identifier. MCP permits string or integer ids; `null`
/// is reserved for parse-error responses and is modeled separately by
/// [`crate::jsonrpc::ResponseId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request id
    Number(i64),
    /// String request id
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// UTC timestamp wrapper used throughout session and cache bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub chrono::DateTime<chrono::Utc>);

impl Timestamp {
    /// Current time.
    #[must_use]
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Seconds elapsed since this timestamp.
    #[must_use]
    pub fn elapsed_secs(&self) -> i64 {
        (chrono::Utc::now() - self.0).num_seconds().max(0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// `{name, version}` pair identifying a client or server implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    /// Implementation name
    pub name: String,
    /// Implementation version
    pub version: String,
}

/// A filesystem or resource boundary declared by a client (or published by
/// the server). Roots are never owned by the session that declared them;
/// they exist purely for boundary checks performed by handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    /// Root URI
    pub uri: String,
    /// Optional display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Message role in a prompt or sampling conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user turn
    User,
    /// Model turn
    Assistant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_displays_both_variants() {
        assert_eq!(RequestId::Number(7).to_string(), "7");
        assert_eq!(RequestId::from("abc").to_string(), "abc");
    }

    #[test]
    fn request_id_round_trips_through_json() {
        let id = RequestId::String("req-1".into());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"req-1\"");
        let parsed: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
