//! MCP domain types: the wire shapes for tools, resources, prompts, roots,
//! and capability negotiation.

mod capabilities;
mod core;
mod prompts;
mod resources;
mod tools;

pub use capabilities::{
    ClientCapabilities, ListChangedCapability, ResourcesCapability, RootsCapability,
    ServerCapabilities,
};
pub use core::{Implementation, RequestId, Role, Root, Timestamp};
pub use prompts::{GetPromptResult, PromptArgument, PromptDescriptor, PromptMessage};
pub use resources::{
    match_uri_template, ResourceContent, ResourceDescriptor, ResourceTemplateDescriptor,
};
pub use tools::{CallToolResult, Content, ToolDescriptor};
