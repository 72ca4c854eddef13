//! Per-client session state.
//!
//! A session is created on transport attach (stdio: exactly one for the
//! process; StreamableHTTP/legacy SSE: one per `mcp-session-id`) and torn
//! down on transport close or an explicit `DELETE`. Teardown is owned by
//! [`crate::server::Server`], which also cancels the session's pending
//! operations and drops its resource subscriptions — the session itself
//! only tracks its own fields.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;

use relaymcp_protocol::types::{ClientCapabilities, RequestId, Root, Timestamp};

/// Identity and granted scopes populated by the auth middleware once a
/// bearer token validates.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Opaque user identifier or client id the token was issued to.
    pub user_info: String,
    /// Scopes granted to the current bearer token.
    pub scopes: Vec<String>,
    /// When this auth context was established.
    pub issued_at: Timestamp,
}

impl AuthContext {
    /// `true` if `scope` is among the granted scopes.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Mutable per-session fields, guarded by a single lock.
#[derive(Debug, Default)]
struct SessionState {
    is_initialized: bool,
    protocol_version: Option<&'static str>,
    client_capabilities: Option<ClientCapabilities>,
    client_roots: Vec<Root>,
    auth_context: Option<AuthContext>,
    bearer_token: Option<String>,
}

/// One connected client's session.
#[derive(Debug)]
pub struct Session {
    /// Opaque session id (a random UUIDv4, or `"stdio"` for the stdio
    /// transport's single session).
    pub id: String,
    /// When this session was created.
    pub connected_at: Timestamp,
    state: RwLock<SessionState>,
}

impl Session {
    /// Create a freshly connected, un-initialized session.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            connected_at: Timestamp::now(),
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Whether `initialize` has completed successfully on this session.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.read().is_initialized
    }

    /// Record a successful `initialize`: negotiated version and client
    /// capabilities/roots.
    pub fn mark_initialized(
        &self,
        version: &'static str,
        capabilities: ClientCapabilities,
        roots: Vec<Root>,
    ) {
        let mut state = self.state.write();
        state.is_initialized = true;
        state.protocol_version = Some(version);
        state.client_capabilities = Some(capabilities);
        state.client_roots = roots;
    }

    /// The negotiated protocol version, if `initialize` has completed.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&'static str> {
        self.state.read().protocol_version
    }

    /// Whether the client declared sampling support in its capabilities.
    #[must_use]
    pub fn supports_sampling(&self) -> bool {
        self.state
            .read()
            .client_capabilities
            .as_ref()
            .is_some_and(|c| c.sampling.is_some())
    }

    /// The client's declared filesystem/resource roots.
    #[must_use]
    pub fn roots(&self) -> Vec<Root> {
        self.state.read().client_roots.clone()
    }

    /// Replace the client's declared roots (`roots/list_changed` from the
    /// client side is out of scope for server-owned bookkeeping beyond
    /// this update).
    pub fn set_roots(&self, roots: Vec<Root>) {
        self.state.write().client_roots = roots;
    }

    /// Set the bearer token presented on the most recent request.
    pub fn set_bearer_token(&self, token: Option<String>) {
        self.state.write().bearer_token = token;
    }

    /// The bearer token presented on the most recent request, if any.
    #[must_use]
    pub fn bearer_token(&self) -> Option<String> {
        self.state.read().bearer_token.clone()
    }

    /// The auth context established by the most recent successful bearer
    /// validation.
    #[must_use]
    pub fn auth_context(&self) -> Option<AuthContext> {
        self.state.read().auth_context.clone()
    }

    /// Populate the auth context after a bearer token validates.
    pub fn set_auth_context(&self, ctx: Option<AuthContext>) {
        self.state.write().auth_context = ctx;
    }
}

/// Session lifecycle event, broadcast on the event plane: connect/disconnect
/// callbacks are a message-passing channel, one producer and many
/// consumers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session was created.
    Connect {
        /// The new session's id.
        session_id: String,
    },
    /// A session was torn down.
    Disconnect {
        /// The session's id.
        session_id: String,
    },
}

/// Owns every live [`Session`], keyed by id. Emits [`SessionEvent`]s on a
/// broadcast channel so observers (e.g. telemetry, the proxy-style
/// embedders this runtime supports) can watch connect/disconnect without
/// the session manager knowing who's listening.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Construct an empty session manager.
    #[must_use]
    pub fn new() -> Self {
        let (events_tx, _rx) = broadcast::channel(256);
        Self {
            sessions: DashMap::new(),
            events_tx,
        }
    }

    /// Subscribe to connect/disconnect events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Create and register a new session, emitting `Connect`. If a session
    /// with this id already exists (e.g. an idempotent re-resolve), the
    /// existing one is returned unchanged and no event fires.
    pub fn get_or_create(&self, id: impl Into<String>) -> Arc<Session> {
        let id = id.into();
        if let Some(existing) = self.sessions.get(&id) {
            return existing.clone();
        }
        let session = Arc::new(Session::new(id.clone()));
        self.sessions.insert(id.clone(), session.clone());
        tracing::debug!(session_id = %id, "session connected");
        let _ = self.events_tx.send(SessionEvent::Connect { session_id: id });
        session
    }

    /// Look up a session by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.clone())
    }

    /// Remove a session, emitting `Disconnect`. Idempotent: removing an
    /// unknown id is a no-op.
    pub fn remove(&self, id: &str) {
        if self.sessions.remove(id).is_some() {
            tracing::debug!(session_id = %id, "session disconnected");
            let _ = self.events_tx.send(SessionEvent::Disconnect {
                session_id: id.to_string(),
            });
        }
    }

    /// Every currently connected session.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Every currently connected, fully initialized session.
    #[must_use]
    pub fn all_initialized(&self) -> Vec<Arc<Session>> {
        self.all().into_iter().filter(|s| s.is_initialized()).collect()
    }

    /// Number of connected sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

// Re-exported so handler code can accept a raw request id without importing
// relaymcp_protocol directly in every module.
pub type OperationRequestId = RequestId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let manager = SessionManager::new();
        let a = manager.get_or_create("s1");
        let b = manager.get_or_create("s1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn remove_unknown_session_is_a_no_op() {
        let manager = SessionManager::new();
        manager.remove("does-not-exist");
        assert_eq!(manager.len(), 0);
    }

    #[tokio::test]
    async fn connect_and_disconnect_emit_events() {
        let manager = SessionManager::new();
        let mut events = manager.subscribe();

        manager.get_or_create("s1");
        manager.remove("s1");

        let first = events.recv().await.unwrap();
        assert!(matches!(first, SessionEvent::Connect { .. }));
        let second = events.recv().await.unwrap();
        assert!(matches!(second, SessionEvent::Disconnect { .. }));
    }

    #[test]
    fn mark_initialized_records_version_and_roots() {
        let session = Session::new("s1");
        assert!(!session.is_initialized());
        session.mark_initialized(
            "2024-11-05",
            ClientCapabilities::default(),
            vec![Root {
                uri: "file:///tmp".into(),
                name: None,
                description: None,
            }],
        );
        assert!(session.is_initialized());
        assert_eq!(session.protocol_version(), Some("2024-11-05"));
        assert_eq!(session.roots().len(), 1);
    }
}
