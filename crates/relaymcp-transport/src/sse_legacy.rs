//! Legacy SSE transport (MCP 2024-11-05): `GET /sse` opens a stream,
//! `POST /message?sessionId=...` posts envelopes. Kept as a thin boundary
//! collaborator — the engineering depth lives in [`crate::streamable_http`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{TransportError, TransportResult};
use crate::traits::{InboundEnvelope, Routing, Transport};

type SseSender = mpsc::UnboundedSender<Value>;

/// Shared state for the legacy SSE transport: one outbound sender per
/// session-id, and an inbound channel the dispatcher drains.
struct SharedState {
    streams: RwLock<HashMap<String, SseSender>>,
    inbound_tx: mpsc::UnboundedSender<InboundEnvelope>,
}

/// Legacy SSE transport. `GET /sse` allocates a fresh session id and opens
/// its stream; `POST /message?sessionId=<id>` delivers one envelope to the
/// dispatcher on behalf of that session.
pub struct LegacySseTransport {
    shared: Arc<SharedState>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<InboundEnvelope>>,
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

impl LegacySseTransport {
    /// Construct a new legacy SSE transport.
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            shared: Arc::new(SharedState {
                streams: RwLock::new(HashMap::new()),
                inbound_tx,
            }),
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        })
    }

    /// Build the axum router exposing `GET /sse` and `POST /message`.
    #[must_use]
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/sse", get(sse_handler))
            .route("/message", post(message_handler))
            .with_state(self.shared.clone())
    }
}

async fn sse_handler(
    State(shared): State<Arc<SharedState>>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let session_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    shared.streams.write().insert(session_id.clone(), tx);
    debug!(%session_id, "legacy SSE stream opened");

    let endpoint_event = futures::stream::once(async move {
        Ok(Event::default()
            .event("endpoint")
            .data(format!("/message?sessionId={session_id}")))
    });

    let message_events = async_stream::stream! {
        while let Some(value) = rx.recv().await {
            yield Ok(Event::default()
                .event("message")
                .data(value.to_string()));
        }
    };

    Sse::new(endpoint_event.chain(message_events))
}

async fn message_handler(
    State(shared): State<Arc<SharedState>>,
    Query(query): Query<MessageQuery>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    if shared.inbound_tx
        .send(InboundEnvelope {
            session_id: query.session_id,
            payload,
            bearer_token: None,
        })
        .is_err()
    {
        warn!("legacy SSE dispatcher channel closed, dropping message");
    }
    axum::http::StatusCode::ACCEPTED
}

#[async_trait]
impl Transport for LegacySseTransport {
    async fn recv(&self) -> Option<InboundEnvelope> {
        self.inbound_rx.lock().await.recv().await
    }

    async fn send(&self, payload: Value, routing: Routing) -> TransportResult<()> {
        let session_id = match &routing {
            Routing::Response { session_id, .. } | Routing::ToSession { session_id } => {
                Some(session_id.clone())
            }
            Routing::Broadcast => None,
        };

        let streams = self.shared.streams.read();
        match session_id {
            Some(id) => streams
                .get(&id)
                .ok_or_else(|| TransportError::UnknownTarget(id.clone()))
                .and_then(|sender| {
                    sender
                        .send(payload)
                        .map_err(|_| TransportError::Closed)
                }),
            None => {
                for sender in streams.values() {
                    let _ = sender.send(payload.clone());
                }
                Ok(())
            }
        }
    }
}
