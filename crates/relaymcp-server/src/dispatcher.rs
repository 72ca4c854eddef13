//! The central dispatch gate: every inbound envelope is classified, gated
//! (known method → initialized → capability → auth → rate limit), handed
//! to a method handler, and answered with
//! exactly one response per request id (notifications produce none).
//!
//! A batch array is split into independent items here exactly the way
//! [`relaymcp_transport::streamable_http`] already splits a batch `POST`
//! into one [`InboundEnvelope`] per member: each item is classified,
//! gated, and responded to on its own. The transport — not this module —
//! is responsible for stitching per-item responses back into one HTTP
//! response when they originated from a single batch.

use std::sync::Arc;

use serde_json::Value;

use relaymcp_protocol::jsonrpc::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcResponsePayload,
    JsonRpcVersion, ResponseId,
};
use relaymcp_protocol::types::{Implementation, RequestId, ServerCapabilities, Timestamp};
use relaymcp_protocol::{version, McpError};
use relaymcp_transport::{required_scope, InboundEnvelope, OAuthService, Routing, Transport, TokenValidator};

use crate::cache::ResourceCache;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handlers;
use crate::operations::OperationTracker;
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use crate::registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
use crate::sampling::SamplingBroker;
use crate::session::{AuthContext, Session, SessionManager};
use crate::subscriptions::SubscriptionRegistry;

/// Methods dispatched before a session has completed `initialize`.
const PRE_INIT_METHODS: &[&str] = &["initialize", "ping"];

/// Methods exempt from the auth gate even when `require_auth` is set: the
/// handshake, liveness probe, and the OAuth surface itself — obtaining a
/// token can never itself require one.
const AUTH_EXEMPT_METHODS: &[&str] =
    &["initialize", "ping", "auth/authorize", "auth/token", "auth/refresh", "auth/revoke"];

/// Every method name this runtime dispatches. Anything else is `-32601
/// Method not found`.
pub(crate) const KNOWN_METHODS: &[&str] = &[
    "initialize",
    "ping",
    "tools/list",
    "tools/call",
    "resources/list",
    "resources/read",
    "resources/templates/list",
    "resources/subscribe",
    "resources/unsubscribe",
    "prompts/list",
    "prompts/get",
    "cancel",
    "health/check",
    "sampling/createMessage",
    "auth/authorize",
    "auth/token",
    "auth/refresh",
    "auth/revoke",
];

/// Cross-cutting state every method handler needs, shared across the
/// runtime via `Arc`.
pub struct Dispatcher {
    pub(crate) sessions: Arc<SessionManager>,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) resources: Arc<ResourceRegistry>,
    pub(crate) prompts: Arc<PromptRegistry>,
    pub(crate) operations: Arc<OperationTracker>,
    pub(crate) cache: Arc<ResourceCache>,
    pub(crate) rate_limiter: Arc<RateLimiter>,
    pub(crate) sampling: Arc<SamplingBroker>,
    pub(crate) subscriptions: Arc<SubscriptionRegistry>,
    pub(crate) oauth: Option<Arc<OAuthService>>,
    pub(crate) config: ServerConfig,
    pub(crate) capabilities: ServerCapabilities,
    pub(crate) server_info: Implementation,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) started_at: Timestamp,
}

impl Dispatcher {
    /// Construct a dispatcher from its fully-wired components. Only
    /// [`crate::server::ServerBuilder`] calls this directly.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
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
        config: ServerConfig,
        capabilities: ServerCapabilities,
        server_info: Implementation,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            sessions,
            tools,
            resources,
            prompts,
            operations,
            cache,
            rate_limiter,
            sampling,
            subscriptions,
            oauth,
            config,
            capabilities,
            server_info,
            transport,
            started_at: Timestamp::now(),
        }
    }

    /// Drive the dispatch loop until the transport closes. Each envelope
    /// is handled on its own task so a slow handler never blocks other
    /// sessions.
    pub async fn run(self: Arc<Self>) {
        while let Some(envelope) = self.transport.recv().await {
            let dispatcher = self.clone();
            tokio::spawn(async move {
                dispatcher.dispatch(envelope).await;
            });
        }
    }

    /// Handle one inbound envelope: apply any presented bearer token to
    /// the session, split a batch payload into independent items, and
    /// dispatch each.
    pub async fn dispatch(&self, envelope: InboundEnvelope) {
        let InboundEnvelope { session_id, payload, bearer_token } = envelope;
        let session = self.sessions.get_or_create(&session_id);
        if let Some(token) = bearer_token {
            session.set_bearer_token(Some(token));
        }

        let items = match relaymcp_protocol::jsonrpc::parse_payload(&payload) {
            Ok(items) => items,
            Err(err) => {
                self.emit_parse_error(&session_id, &err).await;
                return;
            }
        };

        if items.len() == 1 {
            self.dispatch_item(&session_id, &session, items.into_iter().next().unwrap()).await;
            return;
        }

        // A batch dispatches every member concurrently — items are independent
        // and per-request-id correlation, not array position, is what keeps
        // responses from interleaving incorrectly — bounded by the configured
        // batch completion timeout.
        let batch = items
            .into_iter()
            .map(|item| self.dispatch_item(&session_id, &session, item));
        if tokio::time::timeout(self.config.batch_timeout, futures::future::join_all(batch))
            .await
            .is_err()
        {
            tracing::warn!(%session_id, "batch did not complete within the configured timeout");
        }
    }

    async fn dispatch_item(&self, session_id: &str, session: &Arc<Session>, value: Value) {
        match JsonRpcMessage::classify(value) {
            Ok(JsonRpcMessage::Request(request)) => {
                self.process_request(session_id, session, request).await;
            }
            Ok(JsonRpcMessage::Notification(notification)) => {
                self.process_notification(session_id, session, notification);
            }
            Ok(JsonRpcMessage::Response(response)) => {
                self.process_sampling_response(response);
            }
            Err(err) => {
                self.emit_parse_error(session_id, &err).await;
            }
        }
    }

    async fn process_request(&self, session_id: &str, session: &Arc<Session>, request: JsonRpcRequest) {
        let JsonRpcRequest { method, params, id, .. } = request;

        if method == "initialize" {
            let result = handlers::initialize(self, session, params);
            self.respond(session_id, id, result).await;
            return;
        }

        if !KNOWN_METHODS.contains(&method.as_str()) {
            self.respond(session_id, id, Err(ServerError::MethodNotFound(method))).await;
            return;
        }

        if !PRE_INIT_METHODS.contains(&method.as_str()) && !session.is_initialized() {
            self.respond(session_id, id, Err(ServerError::NotInitialized)).await;
            return;
        }

        if let Err(err) = self.check_capability_gate(&method) {
            self.respond(session_id, id, Err(err)).await;
            return;
        }

        if let Err(err) = self.check_auth(session, &method) {
            self.respond(session_id, id, Err(err)).await;
            return;
        }

        if let RateLimitDecision::Denied { retry_after } = self.rate_limiter.check(session_id, &method) {
            self.respond(session_id, id, Err(ServerError::RateLimited { retry_after })).await;
            return;
        }

        let result =
            handlers::handle_method(self, session_id, session, &method, params, id.clone()).await;
        self.respond(session_id, id, result).await;
    }

    fn process_notification(&self, session_id: &str, _session: &Arc<Session>, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                // Client's acknowledgment of a completed handshake; the
                // session is already marked initialized from the
                // `initialize` call itself, so there is nothing to do.
            }
            other => {
                tracing::debug!(method = %other, %session_id, "unhandled notification, ignored");
            }
        }
    }

    /// A server-initiated request (currently only `sampling/createMessage`)
    /// awaits its answer here rather than through the request/response
    /// machinery above.
    fn process_sampling_response(&self, response: JsonRpcResponse) {
        let Some(request_id) = response.request_id().map(ToString::to_string) else {
            return;
        };
        let payload = match response.payload {
            JsonRpcResponsePayload::Success { result } => result,
            JsonRpcResponsePayload::Error { error } => serde_json::json!({ "error": error }),
        };
        if !self.sampling.resolve(&request_id, payload) {
            tracing::debug!(%request_id, "sampling response for unknown or expired request");
        }
    }

    fn check_capability_gate(&self, method: &str) -> ServerResult<()> {
        let missing = match method {
            "tools/list" | "tools/call" if self.capabilities.tools.is_none() => Some("tools"),
            "resources/list" | "resources/read" | "resources/templates/list"
                if self.capabilities.resources.is_none() =>
            {
                Some("resources")
            }
            "resources/subscribe" | "resources/unsubscribe"
                if !self.capabilities.resources.as_ref().is_some_and(|r| r.subscribe) =>
            {
                Some("resources.subscribe")
            }
            "prompts/list" | "prompts/get" if self.capabilities.prompts.is_none() => Some("prompts"),
            _ => None,
        };

        match missing {
            Some(capability) => Err(ServerError::CapabilityMissing(capability.to_string())),
            None => Ok(()),
        }
    }

    /// Validate the session's bearer token against the configured OAuth
    /// store and enforce the method's required scope, if any. A no-op
    /// when `require_auth` is off, or for the exempt methods that
    /// must always be reachable without a token.
    fn check_auth(&self, session: &Session, method: &str) -> ServerResult<()> {
        if !self.config.require_auth || AUTH_EXEMPT_METHODS.contains(&method) {
            return Ok(());
        }

        let oauth = self.oauth.as_ref().ok_or(ServerError::Unauthorized)?;
        let token = session.bearer_token().ok_or(ServerError::Unauthorized)?;
        let info = oauth.validate(&token).ok_or(ServerError::Unauthorized)?;

        session.set_auth_context(Some(AuthContext {
            user_info: info.client_id.clone(),
            scopes: info.scopes.clone(),
            issued_at: Timestamp::now(),
        }));

        if let Some(scope) = required_scope(method) {
            if !info.scopes.iter().any(|s| s == scope) {
                return Err(ServerError::InsufficientScope(scope.to_string()));
            }
        }

        Ok(())
    }

    async fn respond(&self, session_id: &str, id: RequestId, result: ServerResult<Value>) {
        let response = match result {
            Ok(value) => JsonRpcResponse::success(value, id.clone()),
            Err(err) => {
                let mcp_err: McpError = err.into();
                JsonRpcResponse::error(&mcp_err, id.clone())
            }
        };

        let Ok(payload) = serde_json::to_value(&response) else {
            return;
        };
        if let Err(err) = self
            .transport
            .send(payload, Routing::Response { session_id: session_id.to_string(), request_id: id })
            .await
        {
            tracing::debug!(%err, %session_id, "failed to deliver response");
        }
    }

    /// A parse/structural error has no request id to route a `Response`
    /// by, so it is delivered to the session's standalone stream instead
    /// with a null id.
    async fn emit_parse_error(&self, session_id: &str, err: &McpError) {
        let response = JsonRpcResponse {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error: err.into() },
            id: ResponseId::null(),
        };
        let Ok(payload) = serde_json::to_value(&response) else {
            return;
        };
        let _ = self
            .transport
            .send(payload, Routing::ToSession { session_id: session_id.to_string() })
            .await;
    }

    /// Tear down everything owned by a session: cancel its in-flight
    /// operations, drop its resource subscriptions, purge its pending
    /// OAuth codes and issued tokens, and forget the session itself.
    /// Called from the transport's disconnect hook (spec §3 `Session`,
    /// §4.2: disconnect "drops its OAuth code/token maps").
    pub fn teardown_session(&self, session_id: &str) {
        self.operations.cancel_all_for_session(session_id);
        self.subscriptions.remove_session(session_id);
        if let Some(oauth) = &self.oauth {
            oauth.purge_session(session_id);
        }
        self.sessions.remove(session_id);
    }

    /// The negotiated protocol version check used by `initialize`,
    /// exposed so tests can exercise negotiation without a full dispatch.
    pub(crate) fn negotiate_version(requested: &str) -> Result<&'static str, McpError> {
        version::negotiate(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use async_trait::async_trait;
    use relaymcp_transport::TransportResult;
    use tokio::sync::Mutex;

    struct RecordingTransport {
        sent: Mutex<Vec<(Value, Routing)>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self { sent: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn recv(&self) -> Option<InboundEnvelope> {
            None
        }

        async fn send(&self, payload: Value, routing: Routing) -> TransportResult<()> {
            self.sent.lock().await.push((payload, routing));
            Ok(())
        }
    }

    fn test_dispatcher(transport: Arc<RecordingTransport>) -> Dispatcher {
        Dispatcher::new(
            Arc::new(SessionManager::new()),
            Arc::new(ToolRegistry::new()),
            Arc::new(ResourceRegistry::new()),
            Arc::new(PromptRegistry::new()),
            Arc::new(OperationTracker::new()),
            Arc::new(ResourceCache::new(std::time::Duration::from_secs(300))),
            Arc::new(RateLimiter::new(100, std::time::Duration::from_secs(60), false)),
            Arc::new(SamplingBroker::new(std::time::Duration::from_secs(5))),
            Arc::new(SubscriptionRegistry::new()),
            None,
            ServerConfig::default(),
            ServerCapabilities::full(),
            Implementation { name: "test".into(), version: "0.0.0".into() },
            transport,
        )
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = test_dispatcher(transport.clone());

        dispatcher
            .dispatch(InboundEnvelope {
                session_id: "s1".to_string(),
                payload: serde_json::json!({"jsonrpc":"2.0","method":"nope","id":1}),
                bearer_token: None,
            })
            .await;

        let sent = transport.sent.lock().await;
        let (payload, _) = &sent[0];
        assert_eq!(payload["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn uninitialized_session_rejects_tools_call() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = test_dispatcher(transport.clone());

        dispatcher
            .dispatch(InboundEnvelope {
                session_id: "s1".to_string(),
                payload: serde_json::json!({"jsonrpc":"2.0","method":"tools/list","id":1}),
                bearer_token: None,
            })
            .await;

        let sent = transport.sent.lock().await;
        let (payload, _) = &sent[0];
        assert_eq!(payload["error"]["message"], "not initialized");
    }

    #[tokio::test]
    async fn initialize_negotiates_and_marks_session_ready() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = test_dispatcher(transport.clone());

        dispatcher
            .dispatch(InboundEnvelope {
                session_id: "s1".to_string(),
                payload: serde_json::json!({
                    "jsonrpc":"2.0",
                    "method":"initialize",
                    "id":1,
                    "params":{
                        "protocolVersion":"2024-11-05",
                        "clientInfo":{"name":"test","version":"0.0.0"},
                        "capabilities":{}
                    }
                }),
                bearer_token: None,
            })
            .await;

        let session = dispatcher.sessions.get("s1").unwrap();
        assert!(session.is_initialized());

        let sent = transport.sent.lock().await;
        let (payload, _) = &sent[0];
        assert_eq!(payload["result"]["protocolVersion"], "2024-11-05");
    }

    #[tokio::test]
    async fn malformed_envelope_emits_null_id_parse_error() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = test_dispatcher(transport.clone());

        dispatcher
            .dispatch(InboundEnvelope {
                session_id: "s1".to_string(),
                payload: serde_json::json!({"jsonrpc":"2.0"}),
                bearer_token: None,
            })
            .await;

        let sent = transport.sent.lock().await;
        let (payload, routing) = &sent[0];
        assert!(payload["id"].is_null());
        assert!(matches!(routing, Routing::ToSession { .. }));
    }

    #[tokio::test]
    async fn batch_produces_one_response_per_request_id() {
        let transport = Arc::new(RecordingTransport::new());
        let dispatcher = test_dispatcher(transport.clone());

        // `tools/list` before `initialize` fails, but each item still owes
        // exactly its own response; the notification owes none.
        dispatcher
            .dispatch(InboundEnvelope {
                session_id: "s1".to_string(),
                payload: serde_json::json!([
                    {"jsonrpc":"2.0","method":"ping","id":1},
                    {"jsonrpc":"2.0","method":"notifications/initialized"},
                    {"jsonrpc":"2.0","method":"nope","id":2},
                ]),
                bearer_token: None,
            })
            .await;

        let sent = transport.sent.lock().await;
        assert_eq!(sent.len(), 2);
        let ids: std::collections::HashSet<_> =
            sent.iter().map(|(payload, _)| payload["id"].clone()).collect();
        assert!(ids.contains(&serde_json::json!(1)));
        assert!(ids.contains(&serde_json::json!(2)));
    }
}
