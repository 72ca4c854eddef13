//! StreamableHTTP transport (MCP 2025-03-26): a single `/mcp` endpoint
//! multiplexing POST (dispatch), GET (standalone SSE stream), and DELETE
//! (session termination), with a config-selected response shape of SSE,
//! blocking JSON, or polled JSON-async.

mod config;
mod handlers;
mod router;
mod state;

pub use config::{ResponseMode, StreamableHttpConfig, StreamableHttpConfigBuilder};

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use serde_json::Value;

use crate::error::TransportResult;
use crate::oauth::TokenValidator;
use crate::security::OriginPolicy;
use crate::traits::{InboundEnvelope, Routing, Transport};

use state::StreamableHttpState;

/// The StreamableHTTP transport. Clone is cheap (an `Arc` underneath); hand
/// clones to both the axum router (via `.with_state`) and the dispatcher
/// loop that calls [`Transport::recv`]/[`Transport::send`] on it.
pub struct StreamableHttpTransport {
    state: Arc<StreamableHttpState>,
    origin_policy: OriginPolicy,
}

impl StreamableHttpTransport {
    /// Construct a transport with the given config and CORS origin policy.
    #[must_use]
    pub fn new(config: StreamableHttpConfig, origin_policy: OriginPolicy) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(StreamableHttpState::new(config)),
            origin_policy,
        })
    }

    /// Register a callback fired the first time a fresh session id is
    /// minted (on first contact), so the layer above can create its own
    /// `Session` record.
    pub fn on_connect(&self, hook: impl Fn(String) + Send + Sync + 'static) {
        self.state.set_on_connect(Arc::new(hook));
    }

    /// Register a callback fired when a session is torn down via `DELETE`.
    pub fn on_disconnect(&self, hook: impl Fn(String) + Send + Sync + 'static) {
        self.state.set_on_disconnect(Arc::new(hook));
    }

    /// Install the bearer-token validator. When set, every `POST` must
    /// present a valid token before its body is parsed at all (spec §4.5:
    /// "Bearer token (if configured) is validated before any parsing").
    /// `None` (the default) means the deployment has no auth configured and
    /// per-method exemptions are left entirely to the dispatcher.
    pub fn set_auth_validator(&self, validator: Arc<dyn TokenValidator>) {
        self.state.set_auth_validator(validator);
    }

    /// Build the axum router serving this transport.
    #[must_use]
    pub fn router(self: &Arc<Self>) -> Router {
        router::build_router(self.state.clone(), self.origin_policy.cors_layer())
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn recv(&self) -> Option<InboundEnvelope> {
        self.state.recv_inbound().await
    }

    async fn send(&self, payload: Value, routing: Routing) -> TransportResult<()> {
        match routing {
            Routing::Response { session_id, request_id } => {
                self.state.deliver_response(&session_id, &request_id, payload)
            }
            Routing::ToSession { session_id } => self.state.deliver_to_session(&session_id, payload),
            Routing::Broadcast => {
                self.state.broadcast(payload);
                Ok(())
            }
        }
    }
}
