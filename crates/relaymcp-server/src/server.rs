//! [`ServerBuilder`]/[`Server`]: the entry point wiring every cross-cutting
//! collaborator (session manager, registries, operation tracker, cache,
//! rate limiter, sampling broker, subscriptions, optional OAuth store) and
//! a concrete transport into a running [`Dispatcher`].

use std::sync::Arc;

use relaymcp_protocol::jsonrpc::JsonRpcNotification;
use relaymcp_protocol::types::{Implementation, ResourceContent, ServerCapabilities};
use relaymcp_transport::{
    LegacySseTransport, OAuthService, OriginPolicy, Routing, StdioTransport, StreamableHttpConfig,
    StreamableHttpTransport, TokenValidator, Transport,
};

use crate::cache::ResourceCache;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::operations::OperationTracker;
use crate::rate_limit::RateLimiter;
use crate::registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
use crate::sampling::SamplingBroker;
use crate::session::SessionManager;
use crate::subscriptions::SubscriptionRegistry;

/// Accumulates everything a [`Server`] needs before it can be built against
/// a concrete transport. Registries are populated through `.tool()`,
/// `.resource()`, `.resource_template()`, and `.prompt()`; everything else
/// has a sensible default — a server is fully usable with no configuration
/// beyond registering its primitives.
pub struct ServerBuilder {
    config: ServerConfig,
    capabilities: ServerCapabilities,
    sessions: Arc<SessionManager>,
    tools: Arc<ToolRegistry>,
    resources: Arc<ResourceRegistry>,
    prompts: Arc<PromptRegistry>,
    operations: Arc<OperationTracker>,
    cache: Arc<ResourceCache>,
    rate_limiter: Arc<RateLimiter>,
    sampling: Arc<SamplingBroker>,
    subscriptions: Arc<SubscriptionRegistry>,
    oauth: Option<Arc<OAuthService>>,
}

impl ServerBuilder {
    /// Start from the given server identity. Every other collaborator
    /// starts at its default until overridden or populated.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let config = ServerConfig {
            name: name.into(),
            version: version.into(),
            ..ServerConfig::default()
        };
        Self {
            cache: Arc::new(ResourceCache::new(config.resource_cache_ttl)),
            rate_limiter: Arc::new(RateLimiter::new(
                config.rate_limit_requests,
                config.rate_limit_window,
                config.rate_limit_enabled,
            )),
            sampling: Arc::new(SamplingBroker::new(config.sampling_timeout)),
            config,
            capabilities: ServerCapabilities::full(),
            sessions: Arc::new(SessionManager::new()),
            tools: Arc::new(ToolRegistry::new()),
            resources: Arc::new(ResourceRegistry::new()),
            prompts: Arc::new(PromptRegistry::new()),
            operations: Arc::new(OperationTracker::new()),
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            oauth: None,
        }
    }

    /// Replace the default configuration wholesale. Rebuilds the cache,
    /// rate limiter, and sampling broker from the new config's timeouts,
    /// so call this before any of them would otherwise be observed.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.cache = Arc::new(ResourceCache::new(config.resource_cache_ttl));
        self.rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_requests,
            config.rate_limit_window,
            config.rate_limit_enabled,
        ));
        self.sampling = Arc::new(SamplingBroker::new(config.sampling_timeout));
        self.config = config;
        self
    }

    /// Override the capabilities advertised in `initialize`. Defaults to
    /// [`ServerCapabilities::full`].
    #[must_use]
    pub fn capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Register a tool handler.
    ///
    /// # Panics
    /// Panics on a duplicate tool name — registration happens at startup,
    /// before any session exists to observe a recoverable error.
    #[must_use]
    pub fn tool(self, handler: Arc<dyn crate::registry::ToolHandler>) -> Self {
        self.tools.register(handler).expect("duplicate tool registration");
        self
    }

    /// Register a concrete resource handler.
    ///
    /// # Panics
    /// Panics on a duplicate uri, for the same reason as [`Self::tool`].
    #[must_use]
    pub fn resource(
        self,
        descriptor: relaymcp_protocol::types::ResourceDescriptor,
        handler: Arc<dyn crate::registry::ResourceHandler>,
    ) -> Self {
        self.resources.register(descriptor, handler).expect("duplicate resource registration");
        self
    }

    /// Register a resource URI template handler.
    #[must_use]
    pub fn resource_template(
        self,
        descriptor: relaymcp_protocol::types::ResourceTemplateDescriptor,
        handler: Arc<dyn crate::registry::ResourceHandler>,
    ) -> Self {
        self.resources
            .register_template(descriptor, handler)
            .expect("duplicate resource template registration");
        self
    }

    /// Register a prompt handler.
    #[must_use]
    pub fn prompt(self, handler: Arc<dyn crate::registry::PromptHandler>) -> Self {
        self.prompts.register(handler).expect("duplicate prompt registration");
        self
    }

    /// Install the OAuth 2.1 subsystem, enabling `auth/*` methods and, if
    /// `require_auth` is set on the config, gating every other method on a
    /// valid bearer token.
    #[must_use]
    pub fn oauth(mut self, oauth: OAuthService) -> Self {
        self.oauth = Some(Arc::new(oauth));
        self
    }

    /// Install a method-specific rate limit override.
    #[must_use]
    pub fn rate_limit_override(
        self,
        method: impl Into<String>,
        limit: u32,
        window: std::time::Duration,
    ) -> Self {
        self.rate_limiter.set_override(method, limit, window);
        self
    }

    fn server_info(&self) -> Implementation {
        Implementation { name: self.config.name.clone(), version: self.config.version.clone() }
    }

    fn wire_list_changed_hooks(&self, transport: &Arc<dyn Transport>) {
        wire_list_changed(&self.tools, self.capabilities.tools.as_ref().is_some_and(|c| c.list_changed), "tools", transport);
        wire_list_changed(
            &self.resources,
            self.capabilities.resources.as_ref().is_some_and(|c| c.list_changed),
            "resources",
            transport,
        );
        wire_list_changed(&self.prompts, self.capabilities.prompts.as_ref().is_some_and(|c| c.list_changed), "prompts", transport);
    }

    fn into_dispatcher(self, transport: Arc<dyn Transport>) -> Arc<Dispatcher> {
        self.wire_list_changed_hooks(&transport);
        let server_info = self.server_info();
        Arc::new(Dispatcher::new(
            self.sessions,
            self.tools,
            self.resources,
            self.prompts,
            self.operations,
            self.cache,
            self.rate_limiter,
            self.sampling,
            self.subscriptions,
            self.oauth,
            self.config,
            self.capabilities,
            server_info,
            transport,
        ))
    }

    /// Build a server over the stdio transport: one session for the life
    /// of the process.
    #[must_use]
    pub fn build_stdio(self) -> Server {
        let transport = StdioTransport::new();
        let dispatcher = self.into_dispatcher(transport);
        Server { dispatcher, router: None }
    }

    /// Build a server over the legacy SSE transport (MCP 2024-11-05).
    #[must_use]
    pub fn build_legacy_sse(self) -> Server {
        let transport = LegacySseTransport::new();
        let router = transport.router();
        let dispatcher = self.into_dispatcher(transport);
        Server { dispatcher, router: Some(router) }
    }

    /// Build a server over the StreamableHTTP transport (MCP 2025-03-26),
    /// wiring session connect/disconnect directly to the session manager
    /// and dispatcher teardown.
    #[must_use]
    pub fn build_streamable_http(self, http_config: StreamableHttpConfig, origin_policy: OriginPolicy) -> Server {
        let transport = StreamableHttpTransport::new(http_config, origin_policy);

        if let Some(oauth) = self.oauth.clone() {
            transport.set_auth_validator(oauth as Arc<dyn TokenValidator>);
        }

        let sessions = self.sessions.clone();
        transport.on_connect(move |session_id| {
            sessions.get_or_create(session_id);
        });

        let dispatcher = self.into_dispatcher(transport.clone() as Arc<dyn Transport>);
        let teardown_dispatcher = dispatcher.clone();
        transport.on_disconnect(move |session_id| {
            teardown_dispatcher.teardown_session(&session_id);
        });

        let router = transport.router();
        Server { dispatcher, router: Some(router) }
    }
}

/// Install a `list_changed` hook on a registry that broadcasts the
/// matching notification over the transport, bridging the registry's
/// synchronous hook to the transport's async `send` via a spawned task.
fn wire_list_changed<R>(registry: &Arc<R>, enabled: bool, category: &'static str, transport: &Arc<dyn Transport>)
where
    R: ListChangedCapable + ?Sized,
{
    let transport = transport.clone();
    registry.configure_list_changed(
        enabled,
        Arc::new(move || {
            let transport = transport.clone();
            let method = format!("notifications/{category}/list_changed");
            tokio::spawn(async move {
                let notification = JsonRpcNotification::new(method, None);
                if let Ok(payload) = serde_json::to_value(&notification) {
                    let _ = transport.send(payload, Routing::Broadcast).await;
                }
            });
        }),
    );
}

/// A registry that supports installing a `list_changed` broadcast hook —
/// implemented identically by [`ToolRegistry`], [`ResourceRegistry`], and
/// [`PromptRegistry`], extracted here so [`wire_list_changed`] is written
/// once instead of three times.
trait ListChangedCapable {
    fn configure_list_changed(&self, enabled: bool, hook: crate::registry::ListChangedHook);
}

impl ListChangedCapable for ToolRegistry {
    fn configure_list_changed(&self, enabled: bool, hook: crate::registry::ListChangedHook) {
        ToolRegistry::configure_list_changed(self, enabled, hook);
    }
}

impl ListChangedCapable for ResourceRegistry {
    fn configure_list_changed(&self, enabled: bool, hook: crate::registry::ListChangedHook) {
        ResourceRegistry::configure_list_changed(self, enabled, hook);
    }
}

impl ListChangedCapable for PromptRegistry {
    fn configure_list_changed(&self, enabled: bool, hook: crate::registry::ListChangedHook) {
        PromptRegistry::configure_list_changed(self, enabled, hook);
    }
}

/// A fully wired MCP server, ready to run.
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    router: Option<axum::Router>,
}

impl Server {
    /// The axum router for HTTP-facing transports (`None` for stdio).
    /// The caller owns binding a listener and calling `axum::serve`.
    #[must_use]
    pub fn router(&self) -> Option<axum::Router> {
        self.router.clone()
    }

    /// Drive the dispatch loop until the transport closes. For
    /// HTTP-facing transports, run this concurrently with serving
    /// [`Self::router`] on a listener.
    pub async fn run(&self) {
        self.dispatcher.clone().run().await;
    }

    /// Push a `notifications/resources/updated` event to every subscriber
    /// of `uri` and invalidate the cached copy, so the next read is fresh.
    pub async fn notify_resource_updated(&self, uri: &str, content: Option<ResourceContent>) {
        self.dispatcher.cache.invalidate(uri);

        let params = serde_json::json!({ "uri": uri });
        let notification = JsonRpcNotification::new("notifications/resources/updated", Some(params));
        let Ok(payload) = serde_json::to_value(&notification) else {
            return;
        };

        for session_id in self.dispatcher.subscriptions.subscribers_of(uri) {
            if let Err(err) = self
                .dispatcher
                .transport
                .send(payload.clone(), Routing::ToSession { session_id: session_id.clone() })
                .await
            {
                tracing::debug!(%err, %session_id, %uri, "resource update notification not delivered");
            }
        }

        if let Some(content) = content {
            self.dispatcher.cache.put(uri.to_string(), content, None);
        }
    }

    /// Unregister a resource, drop its cached entry, and clear its
    /// subscriber set.
    pub fn remove_resource(&self, uri: &str) {
        self.dispatcher.resources.unregister(uri);
        self.dispatcher.cache.invalidate(uri);
        self.dispatcher.subscriptions.remove_uri(uri);
    }

    /// The session manager, for embedders that want to observe
    /// connect/disconnect events directly.
    #[must_use]
    pub fn sessions(&self) -> Arc<SessionManager> {
        self.dispatcher.sessions.clone()
    }

    /// Gracefully tear down every connected session: cancels in-flight
    /// operations, drops subscriptions, and emits `Disconnect` for each.
    /// Called on shutdown.
    pub fn shutdown(&self) {
        for session in self.dispatcher.sessions.all() {
            self.dispatcher.teardown_session(&session.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HandlerContext;
    use crate::error::ServerResult;
    use crate::registry::ToolHandler;
    use async_trait::async_trait;
    use relaymcp_protocol::types::{CallToolResult, ToolDescriptor};
    use serde_json::Value;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, arguments: Value, _ctx: &HandlerContext) -> ServerResult<CallToolResult> {
            Ok(CallToolResult::text(arguments.to_string()))
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "echo".to_string(),
                description: None,
                input_schema: serde_json::json!({"type": "object"}),
            }
        }
    }

    #[test]
    fn stdio_build_has_no_router() {
        let server = ServerBuilder::new("test", "0.0.0").tool(Arc::new(Echo)).build_stdio();
        assert!(server.router().is_none());
    }

    #[test]
    fn streamable_http_build_has_a_router() {
        let server = ServerBuilder::new("test", "0.0.0")
            .build_streamable_http(StreamableHttpConfig::default(), OriginPolicy::Any);
        assert!(server.router().is_some());
    }

    #[tokio::test]
    async fn shutdown_removes_every_session() {
        let server = ServerBuilder::new("test", "0.0.0").build_stdio();
        server.sessions().get_or_create("s1");
        server.sessions().get_or_create("s2");
        server.shutdown();
        assert_eq!(server.sessions().len(), 0);
    }
}
