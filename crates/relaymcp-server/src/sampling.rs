//! Sampling broker: a one-shot rendezvous correlating a server-initiated
//! `sampling/createMessage` call with the client-delivered
//! `sampling/response`.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};

/// Correlates outstanding `sampling/createMessage` calls by a fresh id.
pub struct SamplingBroker {
    pending: DashMap<String, oneshot::Sender<Value>>,
    timeout: Duration,
}

impl SamplingBroker {
    /// Construct a broker with the given client-response timeout.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            timeout,
        }
    }

    /// Register a fresh request id and return a future that resolves once
    /// [`SamplingBroker::resolve`] is called for it, or times out (default
    /// 60s).
    pub async fn await_response(&self, request_id: &str) -> ServerResult<Value> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.to_string(), tx);

        let result = tokio::time::timeout(self.timeout, rx).await;
        self.pending.remove(request_id);

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ServerError::Internal(
                "sampling response slot dropped".to_string(),
            )),
            Err(_) => Err(ServerError::SamplingTimeout),
        }
    }

    /// Mint a fresh request id for a new `sampling/createMessage` call.
    #[must_use]
    pub fn new_request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Deliver the client's `sampling/response` payload to the waiting
    /// caller. Returns `false` if no one is waiting on this id (already
    /// timed out, or an unsolicited reply).
    pub fn resolve(&self, request_id: &str, payload: Value) -> bool {
        if let Some((_, tx)) = self.pending.remove(request_id) {
            tx.send(payload).is_ok()
        } else {
            false
        }
    }

    /// Number of sampling calls currently awaiting a client reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_completes_the_awaiting_future() {
        let broker = SamplingBroker::new(Duration::from_secs(5));
        let id = SamplingBroker::new_request_id();

        let wait = {
            let broker = &broker;
            let id = id.clone();
            async move { broker.await_response(&id).await }
        };

        let (result, resolved) = tokio::join!(wait, async {
            tokio::task::yield_now().await;
            broker.resolve(&id, serde_json::json!({"ok": true}))
        });

        assert!(resolved);
        assert_eq!(result.unwrap(), serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn resolving_unknown_id_returns_false() {
        let broker = SamplingBroker::new(Duration::from_secs(5));
        assert!(!broker.resolve("nope", serde_json::json!(null)));
    }

    #[tokio::test]
    async fn times_out_when_no_response_arrives() {
        let broker = SamplingBroker::new(Duration::from_millis(5));
        let id = SamplingBroker::new_request_id();
        let result = broker.await_response(&id).await;
        assert!(matches!(result, Err(ServerError::SamplingTimeout)));
    }
}
