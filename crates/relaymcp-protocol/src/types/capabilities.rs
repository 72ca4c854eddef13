//! Capability negotiation types exchanged in `initialize`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Capabilities advertised by the client in `initialize`. The shape is
/// intentionally loose (MCP clients may send extension fields the server
/// does not know about), so unknown keys are preserved in `extra` rather
/// than rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Sampling capability, if the client can serve `sampling/createMessage`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
    /// Roots capability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    /// Experimental / extension capabilities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, Value>>,
    /// Any other fields the client sent
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// `roots` sub-capability: whether the client emits `notifications/roots/list_changed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootsCapability {
    /// Client notifies the server when its root set changes
    #[serde(default, rename = "listChanged")]
    pub list_changed: bool,
}

/// Capabilities the server advertises back in the `initialize` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tools capability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListChangedCapability>,
    /// Resources capability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    /// Prompts capability
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListChangedCapability>,
    /// Logging capability (presence only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
}

/// Shared shape for capabilities that only add a `listChanged` flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListChangedCapability {
    /// Server will emit `notifications/*/list_changed`
    #[serde(default, rename = "listChanged")]
    pub list_changed: bool,
}

/// Resources capability additionally advertises subscribe support.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesCapability {
    /// Server emits `notifications/resources/list_changed`
    #[serde(default, rename = "listChanged")]
    pub list_changed: bool,
    /// Server supports `resources/subscribe` and `resources/unsubscribe`
    #[serde(default)]
    pub subscribe: bool,
}

impl ServerCapabilities {
    /// The capability set this runtime advertises when every primitive
    /// registry and cross-cutting feature is enabled.
    #[must_use]
    pub fn full() -> Self {
        Self {
            tools: Some(ListChangedCapability { list_changed: true }),
            resources: Some(ResourcesCapability {
                list_changed: true,
                subscribe: true,
            }),
            prompts: Some(ListChangedCapability { list_changed: true }),
            logging: Some(Value::Object(Default::default())),
        }
    }
}
