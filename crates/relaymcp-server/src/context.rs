//! The context handed to every registered handler invocation: the
//! operation's cancellation flag and a way to emit progress. Handlers
//! never see the dispatcher, the transport, or other sessions directly —
//! only this narrow surface.

use std::collections::HashMap;
use std::sync::Arc;

use relaymcp_protocol::jsonrpc::JsonRpcNotification;
use relaymcp_protocol::types::RequestId;
use relaymcp_transport::{Routing, Transport};

use crate::operations::OperationHandle;

/// Context passed by reference into [`crate::registry::ToolHandler`],
/// [`crate::registry::ResourceHandler`], and [`crate::registry::PromptHandler`]
/// implementations.
pub struct HandlerContext {
    pub(crate) session_id: String,
    pub(crate) operation: OperationHandle,
    pub(crate) request_id: Option<RequestId>,
    pub(crate) transport: Arc<dyn Transport>,
    /// Named segments extracted from a matched resource URI template;
    /// empty for exact-key resource reads, tool calls, and prompt gets.
    pub uri_bindings: HashMap<String, String>,
}

impl HandlerContext {
    /// The session this invocation belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The tracked operation's id (also the progress token).
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation.id
    }

    /// Poll this at convenient points in long-running handler bodies; the
    /// dispatcher overrides the final response with `-32105` if this is
    /// `true` by the time the handler returns, regardless of what the
    /// handler itself produced.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.operation.is_cancelled()
    }

    /// Emit a `notifications/progress` event for this operation. A no-op
    /// if the originating call carried no request id (shouldn't happen for
    /// tracked operations, but guards against misuse) or delivery fails —
    /// progress is best-effort and never fails the handler.
    pub async fn notify_progress(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        let Some(request_id) = &self.request_id else {
            return;
        };

        let mut params = serde_json::Map::new();
        params.insert("progressToken".into(), serde_json::Value::String(request_id.to_string()));
        params.insert("progress".into(), serde_json::json!(progress));
        if let Some(total) = total {
            params.insert("total".into(), serde_json::json!(total));
        }
        if let Some(message) = message {
            params.insert("message".into(), serde_json::Value::String(message));
        }

        let notification = JsonRpcNotification::new("notifications/progress", Some(serde_json::Value::Object(params)));
        let Ok(payload) = serde_json::to_value(&notification) else {
            return;
        };

        if let Err(err) = self
            .transport
            .send(payload, Routing::ToSession { session_id: self.session_id.clone() })
            .await
        {
            tracing::debug!(%err, operation_id = %self.operation.id, "progress notification not delivered");
        }
    }
}
