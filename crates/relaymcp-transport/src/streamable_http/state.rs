//! Shared bookkeeping for the StreamableHTTP transport: pending response
//! slots, standalone GET streams, and the replay buffer that backs
//! `Last-Event-ID` resumability.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::{DashMap, DashSet};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use relaymcp_protocol::types::RequestId;

use super::config::StreamableHttpConfig;
use crate::oauth::TokenValidator;

/// One SSE event this transport hands to axum's `Sse` response.
#[derive(Debug, Clone)]
pub struct SseEvent {
    /// Monotonic, process-local event id.
    pub id: u64,
    /// JSON-RPC payload (a response or a notification) serialized as the
    /// event's `data` field.
    pub data: Value,
}

/// A stored event kept around briefly so a reconnecting GET stream can
/// replay everything after the `Last-Event-ID` it presents.
#[derive(Debug, Clone)]
struct StoredEvent {
    id: u64,
    data: Value,
}

/// One outstanding slot awaiting the response to a request id, keyed by
/// `"<session_id>:<request_id>"` in [`StreamableHttpState::pending`].
enum PendingSlot {
    /// Part of an SSE stream (single-request or shared across a batch).
    /// Each batch member holds its own clone of the sender; the stream
    /// closes once every clone has been dropped.
    Sse {
        session_id: String,
        sender: mpsc::UnboundedSender<SseEvent>,
    },
    /// A JSON-sync POST blocked on this oneshot.
    JsonSync {
        session_id: String,
        sender: oneshot::Sender<Value>,
    },
    /// A JSON-async POST; the eventual response is parked in
    /// `async_responses` under the same composite key for polling.
    JsonAsync { session_id: String },
}

fn composite_key(session_id: &str, request_id: &RequestId) -> String {
    format!("{session_id}:{request_id}")
}

/// Shared state behind every clone of [`crate::streamable_http::StreamableHttpTransport`].
pub(crate) struct StreamableHttpState {
    pub(crate) config: StreamableHttpConfig,

    /// Sessions this transport has minted an id for.
    known_sessions: DashSet<String>,
    /// Sessions torn down via `DELETE`; any further request for one 404s.
    terminated_sessions: DashSet<String>,

    pending: DashMap<String, PendingSlot>,
    async_responses: DashMap<String, (Value, Instant)>,

    get_streams: DashMap<String, mpsc::UnboundedSender<SseEvent>>,
    replay_buffers: DashMap<String, VecDeque<StoredEvent>>,

    event_counter: AtomicU64,

    inbound_tx: mpsc::UnboundedSender<crate::traits::InboundEnvelope>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<crate::traits::InboundEnvelope>>,

    on_connect: parking_lot::Mutex<Option<Arc<dyn Fn(String) + Send + Sync>>>,
    on_disconnect: parking_lot::Mutex<Option<Arc<dyn Fn(String) + Send + Sync>>>,

    /// Validates a bearer token presented on a `POST`, checked against the
    /// raw header before the body is parsed at all (spec §4.5: "Bearer
    /// token (if configured) is validated before any parsing"). `None`
    /// when the deployment has no auth configured.
    auth_validator: parking_lot::Mutex<Option<Arc<dyn TokenValidator>>>,
}

impl StreamableHttpState {
    pub(crate) fn new(config: StreamableHttpConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            config,
            known_sessions: DashSet::new(),
            terminated_sessions: DashSet::new(),
            pending: DashMap::new(),
            async_responses: DashMap::new(),
            get_streams: DashMap::new(),
            replay_buffers: DashMap::new(),
            event_counter: AtomicU64::new(1),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            on_connect: parking_lot::Mutex::new(None),
            on_disconnect: parking_lot::Mutex::new(None),
            auth_validator: parking_lot::Mutex::new(None),
        }
    }

    pub(crate) fn set_on_connect(&self, hook: Arc<dyn Fn(String) + Send + Sync>) {
        *self.on_connect.lock() = Some(hook);
    }

    pub(crate) fn set_on_disconnect(&self, hook: Arc<dyn Fn(String) + Send + Sync>) {
        *self.on_disconnect.lock() = Some(hook);
    }

    pub(crate) fn set_auth_validator(&self, validator: Arc<dyn TokenValidator>) {
        *self.auth_validator.lock() = Some(validator);
    }

    pub(crate) fn auth_validator(&self) -> Option<Arc<dyn TokenValidator>> {
        self.auth_validator.lock().clone()
    }

    fn next_event_id(&self) -> u64 {
        self.event_counter.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn is_terminated(&self, session_id: &str) -> bool {
        self.terminated_sessions.contains(session_id)
    }

    /// Resolve the session id a request should use: the header value if it
    /// names a live session, otherwise a freshly minted one. Returns the id
    /// together with whether it was just created.
    pub(crate) fn resolve_session(&self, provided: Option<&str>) -> (String, bool) {
        if let Some(id) = provided {
            if self.known_sessions.contains(id) {
                return (id.to_string(), false);
            }
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.known_sessions.insert(id.clone());
        if let Some(hook) = self.on_connect.lock().as_ref() {
            hook(id.clone());
        }
        (id, true)
    }

    pub(crate) async fn terminate_session(&self, session_id: &str) {
        self.terminated_sessions.insert(session_id.to_string());
        self.known_sessions.remove(session_id);
        self.replay_buffers.remove(session_id);
        if let Some((_, sender)) = self.get_streams.remove(session_id) {
            drop(sender);
        }
        self.pending.retain(|_, slot| match slot {
            PendingSlot::Sse { session_id: sid, .. }
            | PendingSlot::JsonSync { session_id: sid, .. }
            | PendingSlot::JsonAsync { session_id: sid } => sid != session_id,
        });
        if let Some(hook) = self.on_disconnect.lock().as_ref() {
            hook(session_id.to_string());
        }
    }

    /// Register a fresh SSE-mode pending slot, returning the receiver the
    /// handler streams to the client.
    pub(crate) fn register_sse(
        &self,
        session_id: &str,
        request_id: &RequestId,
        sender: mpsc::UnboundedSender<SseEvent>,
    ) {
        self.pending.insert(
            composite_key(session_id, request_id),
            PendingSlot::Sse {
                session_id: session_id.to_string(),
                sender,
            },
        );
    }

    pub(crate) fn register_json_sync(
        &self,
        session_id: &str,
        request_id: &RequestId,
    ) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            composite_key(session_id, request_id),
            PendingSlot::JsonSync {
                session_id: session_id.to_string(),
                sender: tx,
            },
        );
        rx
    }

    pub(crate) fn register_json_async(&self, session_id: &str, request_id: &RequestId) {
        self.pending.insert(
            composite_key(session_id, request_id),
            PendingSlot::JsonAsync {
                session_id: session_id.to_string(),
            },
        );
    }

    /// Poll for a JSON-async response. Returns `Some(response)` and evicts
    /// it on a hit; `None` if still pending or unknown.
    pub(crate) fn take_async_response(&self, session_id: &str, request_id_raw: &str) -> Option<Value> {
        let key = format!("{session_id}:{request_id_raw}");
        self.async_responses.remove(&key).map(|(_, (value, _))| value)
    }

    pub(crate) fn has_pending_async(&self, session_id: &str, request_id_raw: &str) -> bool {
        let key = format!("{session_id}:{request_id_raw}");
        self.pending.get(&key).is_some()
    }

    /// Evict completed JSON-async responses older than the configured GC
    /// window; called periodically by the background sweeper.
    pub(crate) fn gc_async_responses(&self) {
        let cutoff = self.config.json_async_gc_after;
        self.async_responses
            .retain(|_, (_, stored_at)| stored_at.elapsed() < cutoff);
    }

    fn push_replay(&self, session_id: &str, event: &SseEvent) {
        let mut buf = self.replay_buffers.entry(session_id.to_string()).or_default();
        if buf.len() >= self.config.replay_buffer_size {
            buf.pop_front();
        }
        buf.push_back(StoredEvent {
            id: event.id,
            data: event.data.clone(),
        });
    }

    /// Replay buffered events with id greater than `last_event_id` onto a
    /// freshly (re)opened GET stream.
    pub(crate) fn replay_since(&self, session_id: &str, last_event_id: u64) -> Vec<SseEvent> {
        self.replay_buffers
            .get(session_id)
            .map(|buf| {
                buf.iter()
                    .filter(|e| e.id > last_event_id)
                    .map(|e| SseEvent {
                        id: e.id,
                        data: e.data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn register_get_stream(
        &self,
        session_id: &str,
        sender: mpsc::UnboundedSender<SseEvent>,
    ) {
        // A fresh GET supersedes any stream already open for this session.
        self.get_streams.insert(session_id.to_string(), sender);
    }

    pub(crate) fn deliver_response(
        &self,
        session_id: &str,
        request_id: &RequestId,
        payload: Value,
    ) -> crate::error::TransportResult<()> {
        let key = composite_key(session_id, request_id);
        match self.pending.remove(&key) {
            Some((_, PendingSlot::Sse { sender, .. })) => {
                let event = SseEvent {
                    id: self.next_event_id(),
                    data: payload,
                };
                self.push_replay(session_id, &event);
                let _ = sender.send(event);
                Ok(())
            }
            Some((_, PendingSlot::JsonSync { sender, .. })) => {
                let _ = sender.send(payload);
                Ok(())
            }
            Some((_, PendingSlot::JsonAsync { .. })) => {
                self.async_responses.insert(key, (payload, Instant::now()));
                Ok(())
            }
            None => Err(crate::error::TransportError::UnknownTarget(key)),
        }
    }

    pub(crate) fn deliver_to_session(
        &self,
        session_id: &str,
        payload: Value,
    ) -> crate::error::TransportResult<()> {
        if let Some(sender) = self.get_streams.get(session_id) {
            let event = SseEvent {
                id: self.next_event_id(),
                data: payload,
            };
            self.push_replay(session_id, &event);
            let _ = sender.send(event);
            return Ok(());
        }

        // No standalone stream: fall back to any open per-request SSE
        // streams belonging to this session so in-flight callers still see
        // progress notifications.
        let mut delivered = false;
        for entry in self.pending.iter() {
            if let PendingSlot::Sse {
                session_id: sid,
                sender,
            } = entry.value()
            {
                if sid == session_id {
                    let event = SseEvent {
                        id: self.next_event_id(),
                        data: payload.clone(),
                    };
                    if sender.send(event).is_ok() {
                        delivered = true;
                    }
                }
            }
        }

        if delivered {
            Ok(())
        } else {
            Err(crate::error::TransportError::UnknownTarget(session_id.to_string()))
        }
    }

    pub(crate) fn broadcast(&self, payload: Value) {
        for entry in self.get_streams.iter() {
            let event = SseEvent {
                id: self.next_event_id(),
                data: payload.clone(),
            };
            let _ = entry.send(event);
        }
    }

    pub(crate) fn push_inbound(&self, envelope: crate::traits::InboundEnvelope) {
        let _ = self.inbound_tx.send(envelope);
    }

    pub(crate) async fn recv_inbound(&self) -> Option<crate::traits::InboundEnvelope> {
        self.inbound_rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> StreamableHttpState {
        StreamableHttpState::new(StreamableHttpConfig::default())
    }

    #[test]
    fn resolve_session_mints_fresh_id_when_absent() {
        let state = state();
        let (id, is_new) = state.resolve_session(None);
        assert!(is_new);
        assert!(!id.is_empty());
    }

    #[test]
    fn resolve_session_reuses_known_id() {
        let state = state();
        let (id, _) = state.resolve_session(None);
        let (again, is_new) = state.resolve_session(Some(&id));
        assert_eq!(id, again);
        assert!(!is_new);
    }

    #[test]
    fn resolve_session_mints_fresh_id_for_unknown_provided() {
        let state = state();
        let (id, is_new) = state.resolve_session(Some("not-registered"));
        assert!(is_new);
        assert_ne!(id, "not-registered");
    }

    #[tokio::test]
    async fn json_sync_slot_delivers_exactly_once() {
        let state = state();
        let (session_id, _) = state.resolve_session(None);
        let request_id = RequestId::from(1i64);
        let rx = state.register_json_sync(&session_id, &request_id);

        state
            .deliver_response(&session_id, &request_id, serde_json::json!({"ok": true}))
            .unwrap();

        let value = rx.await.unwrap();
        assert_eq!(value, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn delivering_to_unknown_request_id_errors() {
        let state = state();
        let (session_id, _) = state.resolve_session(None);
        let err = state
            .deliver_response(&session_id, &RequestId::from(99i64), serde_json::json!(null))
            .unwrap_err();
        assert!(matches!(err, crate::error::TransportError::UnknownTarget(_)));
    }

    #[tokio::test]
    async fn async_response_round_trips_through_poll() {
        let state = state();
        let (session_id, _) = state.resolve_session(None);
        let request_id = RequestId::from(7i64);
        state.register_json_async(&session_id, &request_id);
        assert!(state.has_pending_async(&session_id, "7"));

        state
            .deliver_response(&session_id, &request_id, serde_json::json!({"done": 1}))
            .unwrap();

        assert_eq!(
            state.take_async_response(&session_id, "7"),
            Some(serde_json::json!({"done": 1}))
        );
        // Evicted after the first successful poll.
        assert_eq!(state.take_async_response(&session_id, "7"), None);
    }

    #[tokio::test]
    async fn terminate_session_tears_down_pending_slots() {
        let state = state();
        let (session_id, _) = state.resolve_session(None);
        let request_id = RequestId::from(1i64);
        let _rx = state.register_json_sync(&session_id, &request_id);

        state.terminate_session(&session_id).await;

        assert!(state.is_terminated(&session_id));
        let err = state
            .deliver_response(&session_id, &request_id, serde_json::json!(null))
            .unwrap_err();
        assert!(matches!(err, crate::error::TransportError::UnknownTarget(_)));
    }

    #[test]
    fn replay_since_only_returns_newer_events() {
        let state = state();
        let session_id = "s1".to_string();
        state.push_replay(&session_id, &SseEvent { id: 1, data: serde_json::json!(1) });
        state.push_replay(&session_id, &SseEvent { id: 2, data: serde_json::json!(2) });
        state.push_replay(&session_id, &SseEvent { id: 3, data: serde_json::json!(3) });

        let replayed = state.replay_since(&session_id, 1);
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].id, 2);
        assert_eq!(replayed[1].id, 3);
    }
}
