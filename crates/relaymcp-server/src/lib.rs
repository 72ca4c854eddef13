//! # relaymcp-server
//!
//! The MCP server runtime: session lifecycle, the dispatch gate, the
//! tool/resource/prompt registries, resource caching and subscriptions,
//! operation tracking with cooperative cancellation, the sampling broker,
//! and the [`ServerBuilder`]/[`Server`] entry point that wires all of it
//! to a `relaymcp-transport` transport.
//!
//! `relaymcp-protocol` defines the wire types; `relaymcp-transport`
//! defines how bytes move; this crate is where request handling actually
//! happens.

pub mod cache;
pub mod config;
pub mod context;
mod dispatcher;
pub mod error;
mod handlers;
pub mod operations;
pub mod rate_limit;
pub mod registry;
pub mod sampling;
pub mod server;
pub mod session;
pub mod subscriptions;

pub use cache::{CacheStats, ResourceCache};
pub use config::{ServerConfig, ServerConfigBuilder};
pub use context::HandlerContext;
pub use error::{ServerError, ServerResult};
pub use operations::{CancelError, OperationHandle, OperationKind, OperationTracker};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use registry::{
    ListChangedHook, PromptHandler, PromptRegistry, ResourceHandler, ResourceRegistry, ToolHandler,
    ToolRegistry,
};
pub use sampling::SamplingBroker;
pub use server::{Server, ServerBuilder};
pub use session::{AuthContext, Session, SessionEvent, SessionManager};
pub use subscriptions::SubscriptionRegistry;
