//! The three primitive registries — Tools, Resources (with URI templates),
//! and Prompts.
//!
//! Each registry pairs an immutable descriptor with a handler reference,
//! keyed by name or uri, and fires a `list_changed` hook on add/remove
//! when the server's capability for that category declares `listChanged`
//! (the hook pattern mirrors `StreamableHttpTransport::on_connect` in
//! `relaymcp-transport`).

mod prompts;
mod resources;
mod tools;

pub use prompts::{PromptHandler, PromptRegistry};
pub use resources::{ResourceHandler, ResourceRegistry};
pub use tools::{ToolHandler, ToolRegistry};

use std::sync::Arc;

/// A `notifications/{tools,resources,prompts}/list_changed` hook, fired
/// after a successful register/unregister when the category's
/// `listChanged` capability is enabled.
pub type ListChangedHook = Arc<dyn Fn() + Send + Sync>;
