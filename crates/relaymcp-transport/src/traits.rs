//! The transport-agnostic boundary the dispatcher programs against (spec
//! §2, Transport row). Every transport — stdio, legacy SSE, StreamableHTTP —
//! implements this the same way: it hands the dispatcher a stream of
//! inbound envelopes annotated with a session id, and accepts outbound
//! envelopes with a routing hint describing who should receive them.

use async_trait::async_trait;
use serde_json::Value;

use relaymcp_protocol::types::RequestId;

use crate::error::TransportResult;

/// One raw envelope (or batch array) received off the wire, tagged with the
/// session it arrived on.
#[derive(Debug, Clone)]
pub struct InboundEnvelope {
    /// Session this message belongs to
    pub session_id: String,
    /// Raw JSON payload: a single object or a batch array
    pub payload: Value,
    /// Bearer token presented alongside this envelope, if the transport
    /// exposes one (an `Authorization: Bearer ...` header on HTTP-facing
    /// transports; always `None` on stdio). The dispatcher applies this to
    /// the session before evaluating the auth gate, so a token only needs
    /// to be presented once per request to remain attached to the session.
    pub bearer_token: Option<String>,
}

/// Where an outbound message should be delivered. The dispatcher never
/// knows about SSE streams or HTTP response slots directly — it only ever
/// emits one of these.
#[derive(Debug, Clone)]
pub enum Routing {
    /// A response to a specific request id, routed back to whichever
    /// pending slot (SSE stream, JSON-sync waiter, JSON-async store) is
    /// waiting for that id on the originating session.
    Response {
        /// Session that issued the original request
        session_id: String,
        /// Id of the request being answered
        request_id: RequestId,
    },
    /// A server-initiated notification/request targeted at one session's
    /// standalone stream (e.g. a progress update, a `sampling/createMessage`
    /// call).
    ToSession {
        /// Target session
        session_id: String,
    },
    /// A notification broadcast to every initialized session's standalone
    /// stream (e.g. `notifications/tools/list_changed`).
    Broadcast,
}

/// The transport boundary. Implementations own their own connection
/// bookkeeping (stdin/stdout, SSE writers, HTTP response slots) behind this
/// single interface.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Receive the next inbound envelope, or `None` once the transport is
    /// closed and will produce no further messages.
    async fn recv(&self) -> Option<InboundEnvelope>;

    /// Send an outbound JSON payload (a serialized `JsonRpcResponse` or
    /// `JsonRpcNotification`) according to `routing`.
    async fn send(&self, payload: Value, routing: Routing) -> TransportResult<()>;
}
