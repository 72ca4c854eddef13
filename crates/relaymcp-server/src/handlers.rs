//! Per-method handler bodies invoked by [`crate::dispatcher::Dispatcher`].
//! `initialize` is special-cased by the dispatcher (it runs before a
//! session is marked initialized); every other known method goes through
//! [`handle_method`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use relaymcp_protocol::jsonrpc::JsonRpcRequest;
use relaymcp_protocol::types::{ClientCapabilities, RequestId, Root};
use relaymcp_transport::{Routing, TokenPair};

use crate::context::HandlerContext;
use crate::dispatcher::Dispatcher;
use crate::error::{ServerError, ServerResult};
use crate::operations::{CancelError, OperationKind};
use crate::sampling::SamplingBroker;
use crate::session::Session;

/// `initialize`: negotiate a protocol version, record the client's
/// capabilities and roots, and advertise this server's own capabilities.
pub(crate) fn initialize(
    dispatcher: &Dispatcher,
    session: &Arc<Session>,
    params: Option<Value>,
) -> ServerResult<Value> {
    let params = params.ok_or_else(|| ServerError::InvalidParams("initialize requires params".into()))?;

    let requested_version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| ServerError::InvalidParams("missing 'protocolVersion'".into()))?;
    let negotiated = Dispatcher::negotiate_version(requested_version).map_err(ServerError::Protocol)?;

    let capabilities: ClientCapabilities = params
        .get("capabilities")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|err| ServerError::InvalidParams(err.to_string()))?
        .unwrap_or_default();

    let roots: Vec<Root> = params
        .get("roots")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|err| ServerError::InvalidParams(err.to_string()))?
        .unwrap_or_default();

    session.mark_initialized(negotiated, capabilities, roots);
    tracing::info!(session_id = %session.id, protocol_version = %negotiated, "session initialized");

    Ok(serde_json::json!({
        "protocolVersion": negotiated,
        "serverInfo": dispatcher.server_info,
        "capabilities": dispatcher.capabilities,
    }))
}

/// Every method handled past `initialize`. `method` is always a member
/// of [`crate::dispatcher::KNOWN_METHODS`] by
/// the time this is called, since the dispatcher rejects anything else
/// before reaching here.
pub(crate) async fn handle_method(
    dispatcher: &Dispatcher,
    session_id: &str,
    session: &Arc<Session>,
    method: &str,
    params: Option<Value>,
    id: RequestId,
) -> ServerResult<Value> {
    match method {
        "ping" => Ok(serde_json::json!({})),

        "tools/list" => Ok(serde_json::json!({ "tools": dispatcher.tools.list() })),

        "tools/call" => {
            let params = params.ok_or_else(|| ServerError::InvalidParams("tools/call requires params".into()))?;
            let name = required_str(&params, "name")?.to_string();
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| Value::Object(Default::default()));
            let handler = dispatcher.tools.get(&name).ok_or_else(|| ServerError::ToolNotFound(name.clone()))?;

            let handle = dispatcher.operations.register(session_id, OperationKind::Tool(name), Some(id));
            let ctx = HandlerContext {
                session_id: session_id.to_string(),
                operation: handle.clone(),
                request_id: Some(handle_request_id(&handle)),
                transport: dispatcher.transport.clone(),
                uri_bindings: Default::default(),
            };
            let result = handler.call(arguments, &ctx).await;
            dispatcher.operations.complete(&handle.id);
            if handle.is_cancelled() {
                return Err(ServerError::Cancelled);
            }
            serde_json::to_value(result?).map_err(|err| ServerError::Internal(err.to_string()))
        }

        "resources/list" => Ok(serde_json::json!({ "resources": dispatcher.resources.list() })),

        "resources/templates/list" => {
            Ok(serde_json::json!({ "resourceTemplates": dispatcher.resources.list_templates() }))
        }

        "resources/read" => {
            let params = params.ok_or_else(|| ServerError::InvalidParams("resources/read requires params".into()))?;
            let uri = required_str(&params, "uri")?.to_string();
            let no_cache = params.get("no_cache").and_then(Value::as_bool).unwrap_or(false);
            let cacheable = params.get("cacheable").and_then(Value::as_bool).unwrap_or(true);
            let cache_max_age =
                params.get("cache_max_age").and_then(Value::as_u64).map(Duration::from_secs);

            if !no_cache {
                if let Some(content) = dispatcher.cache.get(&uri) {
                    return serde_json::to_value(content).map_err(|err| ServerError::Internal(err.to_string()));
                }
            }

            let lookup = dispatcher.resources.resolve(&uri).ok_or_else(|| ServerError::ResourceNotFound(uri.clone()))?;

            let handle = dispatcher.operations.register(session_id, OperationKind::Resource(uri.clone()), Some(id));
            let ctx = HandlerContext {
                session_id: session_id.to_string(),
                operation: handle.clone(),
                request_id: Some(handle_request_id(&handle)),
                transport: dispatcher.transport.clone(),
                uri_bindings: lookup.bindings,
            };
            let result = lookup.handler.read(&uri, &ctx).await;
            dispatcher.operations.complete(&handle.id);
            if handle.is_cancelled() {
                return Err(ServerError::Cancelled);
            }
            let content = result?;
            if cacheable {
                dispatcher.cache.put(uri, content.clone(), cache_max_age);
            }
            serde_json::to_value(content).map_err(|err| ServerError::Internal(err.to_string()))
        }

        "resources/subscribe" => {
            let params = params.ok_or_else(|| ServerError::InvalidParams("resources/subscribe requires params".into()))?;
            let uri = required_str(&params, "uri")?.to_string();
            dispatcher.subscriptions.subscribe(uri, session_id);
            Ok(serde_json::json!({ "success": true }))
        }

        "resources/unsubscribe" => {
            let params = params.ok_or_else(|| ServerError::InvalidParams("resources/unsubscribe requires params".into()))?;
            let uri = required_str(&params, "uri")?;
            dispatcher.subscriptions.unsubscribe(uri, session_id);
            Ok(serde_json::json!({ "success": true }))
        }

        "prompts/list" => Ok(serde_json::json!({ "prompts": dispatcher.prompts.list() })),

        "prompts/get" => {
            let params = params.ok_or_else(|| ServerError::InvalidParams("prompts/get requires params".into()))?;
            let name = required_str(&params, "name")?.to_string();
            let arguments: std::collections::HashMap<String, String> = params
                .get("arguments")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|err| ServerError::InvalidParams(err.to_string()))?
                .unwrap_or_default();
            let handler = dispatcher.prompts.get(&name).ok_or_else(|| ServerError::PromptNotFound(name.clone()))?;

            let handle = dispatcher.operations.register(session_id, OperationKind::Prompt(name), Some(id));
            let ctx = HandlerContext {
                session_id: session_id.to_string(),
                operation: handle.clone(),
                request_id: Some(handle_request_id(&handle)),
                transport: dispatcher.transport.clone(),
                uri_bindings: Default::default(),
            };
            let result = handler.get(arguments, &ctx).await;
            dispatcher.operations.complete(&handle.id);
            if handle.is_cancelled() {
                return Err(ServerError::Cancelled);
            }
            serde_json::to_value(result?).map_err(|err| ServerError::Internal(err.to_string()))
        }

        "cancel" => {
            let params = params.ok_or_else(|| ServerError::InvalidParams("cancel requires params".into()))?;
            let operation_id = required_str(&params, "id")?;
            match dispatcher.operations.cancel(session_id, operation_id) {
                Ok(()) => Ok(serde_json::json!({ "cancelled": true })),
                Err(CancelError::Unknown) => Err(ServerError::UnknownOperation(operation_id.to_string())),
                Err(CancelError::NotOwner) => Err(ServerError::Unauthorized),
            }
        }

        "health/check" => {
            let stats = dispatcher.cache.stats();
            Ok(serde_json::json!({
                "status": "ok",
                "uptimeSecs": dispatcher.started_at.elapsed_secs(),
                "sessions": dispatcher.sessions.len(),
                "tools": dispatcher.tools.len(),
                "resources": dispatcher.resources.list().len(),
                "prompts": dispatcher.prompts.list().len(),
                "operationsInFlight": dispatcher.operations.len(),
                "cache": { "hits": stats.hits, "misses": stats.misses },
            }))
        }

        "sampling/createMessage" => {
            if !session.supports_sampling() {
                return Err(ServerError::SamplingUnsupported);
            }

            let request_id = SamplingBroker::new_request_id();
            let handle = dispatcher.operations.register(session_id, OperationKind::Sampling, Some(id));

            let forwarded = JsonRpcRequest::new(
                "sampling/createMessage",
                params,
                RequestId::String(request_id.clone()),
            );
            let payload = serde_json::to_value(&forwarded).map_err(|err| ServerError::Internal(err.to_string()))?;
            if let Err(err) = dispatcher
                .transport
                .send(payload, Routing::ToSession { session_id: session_id.to_string() })
                .await
            {
                dispatcher.operations.complete(&handle.id);
                return Err(ServerError::Internal(err.to_string()));
            }

            let result = dispatcher.sampling.await_response(&request_id).await;
            dispatcher.operations.complete(&handle.id);
            if handle.is_cancelled() {
                return Err(ServerError::Cancelled);
            }
            result
        }

        "auth/authorize" => {
            let oauth = dispatcher.oauth.as_ref().ok_or_else(oauth_not_configured)?;
            let params = params.ok_or_else(|| ServerError::InvalidParams("auth/authorize requires params".into()))?;
            let client_id = required_str(&params, "client_id")?;
            let redirect_uri = required_str(&params, "redirect_uri")?;
            let scope = params
                .get("scope")
                .and_then(Value::as_str)
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            let code_challenge = params.get("code_challenge").and_then(Value::as_str).map(str::to_string);

            let code = oauth.authorize(client_id, redirect_uri, scope, code_challenge, session_id);
            Ok(serde_json::json!({ "code": code }))
        }

        "auth/token" => {
            let oauth = dispatcher.oauth.as_ref().ok_or_else(oauth_not_configured)?;
            let params = params.ok_or_else(|| ServerError::InvalidParams("auth/token requires params".into()))?;
            let grant_type = required_str(&params, "grant_type")?;

            let pair = match grant_type {
                "authorization_code" => {
                    let code = required_str(&params, "code")?;
                    let client_id = required_str(&params, "client_id")?;
                    let redirect_uri = required_str(&params, "redirect_uri")?;
                    let code_verifier = params.get("code_verifier").and_then(Value::as_str);
                    oauth.exchange_code(code, client_id, redirect_uri, code_verifier, session_id)
                }
                "client_credentials" => {
                    let client_id = required_str(&params, "client_id")?;
                    let client_secret = required_str(&params, "client_secret")?;
                    oauth.client_credentials(client_id, client_secret, session_id)
                }
                "refresh_token" => {
                    let refresh_token = required_str(&params, "refresh_token")?;
                    oauth.refresh(refresh_token)
                }
                other => return Err(ServerError::InvalidParams(format!("unsupported grant_type '{other}'"))),
            }
            .map_err(|err| ServerError::Handler(err.to_string()))?;

            Ok(token_pair_to_json(&pair))
        }

        "auth/refresh" => {
            let oauth = dispatcher.oauth.as_ref().ok_or_else(oauth_not_configured)?;
            let params = params.ok_or_else(|| ServerError::InvalidParams("auth/refresh requires params".into()))?;
            let refresh_token = required_str(&params, "refresh_token")?;
            let pair = oauth.refresh(refresh_token).map_err(|err| ServerError::Handler(err.to_string()))?;
            Ok(token_pair_to_json(&pair))
        }

        "auth/revoke" => {
            let oauth = dispatcher.oauth.as_ref().ok_or_else(oauth_not_configured)?;
            let params = params.ok_or_else(|| ServerError::InvalidParams("auth/revoke requires params".into()))?;
            let token = required_str(&params, "token")?;
            oauth.revoke(token);
            Ok(serde_json::json!({ "revoked": true }))
        }

        other => Err(ServerError::MethodNotFound(other.to_string())),
    }
}

fn required_str<'a>(params: &'a Value, key: &str) -> ServerResult<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ServerError::InvalidParams(format!("missing '{key}'")))
}

fn token_pair_to_json(pair: &TokenPair) -> Value {
    serde_json::json!({
        "access_token": pair.access_token,
        "token_type": "Bearer",
        "expires_in": pair.expires_in,
        "scope": pair.scopes.join(" "),
        "refresh_token": pair.refresh_token,
    })
}

fn oauth_not_configured() -> ServerError {
    ServerError::Internal("oauth subsystem not configured".to_string())
}

/// The request id an operation was registered under, re-derived from the
/// tracker rather than threaded through every call site a second time.
fn handle_request_id(handle: &crate::operations::OperationHandle) -> RequestId {
    RequestId::String(handle.id.clone())
}
