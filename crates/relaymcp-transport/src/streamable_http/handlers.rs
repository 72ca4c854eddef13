//! Axum handlers for the StreamableHTTP transport's single `/mcp` endpoint:
//! `POST` dispatches requests/notifications/batches, `GET` opens the
//! standalone SSE stream, `DELETE` terminates a session.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::Stream;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use relaymcp_protocol::jsonrpc::{parse_payload, JsonRpcMessage};
use relaymcp_protocol::types::RequestId;

use super::config::ResponseMode;
use super::state::{SseEvent, StreamableHttpState};
use crate::traits::InboundEnvelope;

pub(crate) const SESSION_HEADER: &str = "mcp-session-id";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

fn to_sse_item(event: SseEvent) -> Result<Event, Infallible> {
    Ok(Event::default().id(event.id.to_string()).event("message").data(event.data.to_string()))
}

/// `POST <endpoint>`: accepts a single JSON-RPC envelope or a batch array.
pub(crate) async fn post_handler(
    State(state): State<std::sync::Arc<StreamableHttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(provided) = session_header(&headers) {
        if state.is_terminated(provided) {
            return StatusCode::NOT_FOUND.into_response();
        }
    }

    // Bearer token is checked against the raw header, before the body is
    // read at all: a presented-but-invalid token is rejected immediately so
    // neither a body-size nor a parse error is ever disclosed ahead of it.
    // An absent token falls through unchanged — whether the target method
    // actually requires auth is the dispatcher's per-method exemption call.
    let bearer_token = bearer_token(&headers);
    if let Some(token) = &bearer_token {
        if let Some(validator) = state.auth_validator() {
            if validator.validate(token).is_none() {
                debug!("rejected streamable http request with invalid bearer token");
                return invalid_token_response(&state, session_header(&headers));
            }
        }
    }

    if body.len() > state.config.max_body_bytes {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    }

    let raw: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            debug!(%err, "malformed request body");
            return parse_error_response(&state, session_header(&headers));
        }
    };

    let items = match parse_payload(&raw) {
        Ok(items) => items,
        Err(err) => {
            debug!(%err, "invalid JSON-RPC envelope");
            return parse_error_response(&state, session_header(&headers));
        }
    };

    let (session_id, is_new) = state.resolve_session(session_header(&headers));
    if is_new {
        debug!(%session_id, "streamable http session established");
    }

    let mut awaited_ids: Vec<RequestId> = Vec::new();

    for value in &items {
        match JsonRpcMessage::classify(value.clone()) {
            Ok(JsonRpcMessage::Request(request)) => awaited_ids.push(request.id),
            Ok(_) => {}
            Err(err) => warn!(%err, "could not classify batch member, forwarding as-is"),
        }

        state.push_inbound(InboundEnvelope {
            session_id: session_id.clone(),
            payload: value.clone(),
            bearer_token: bearer_token.clone(),
        });
    }

    match state.config.response_mode {
        ResponseMode::Sse => post_sse_response(&state, &session_id, &items, &awaited_ids).await,
        ResponseMode::JsonSync => {
            post_json_sync_response(&state, &session_id, &awaited_ids).await
        }
        ResponseMode::JsonAsync => post_json_async_response(&state, &session_id, &awaited_ids),
    }
}

/// Register one shared SSE stream across every request id in the batch (or
/// the single request id), then stream responses as they complete.
async fn post_sse_response(
    state: &std::sync::Arc<StreamableHttpState>,
    session_id: &str,
    _items: &[Value],
    awaited_ids: &[RequestId],
) -> Response {
    if awaited_ids.is_empty() {
        // Notifications/responses only: nothing to stream back.
        return with_session_header(StatusCode::ACCEPTED.into_response(), session_id);
    }

    let (tx, rx) = mpsc::unbounded_channel::<SseEvent>();
    for request_id in awaited_ids {
        state.register_sse(session_id, request_id, tx.clone());
    }
    drop(tx); // each registered slot holds its own clone; the stream ends once all are dropped

    let stream = tokio_stream_from_receiver(rx).map(to_sse_item);
    let sse = Sse::new(stream).keep_alive(KeepAlive::default());
    with_session_header(sse.into_response(), session_id)
}

async fn post_json_sync_response(
    state: &std::sync::Arc<StreamableHttpState>,
    session_id: &str,
    awaited_ids: &[RequestId],
) -> Response {
    if awaited_ids.is_empty() {
        return with_session_header(StatusCode::ACCEPTED.into_response(), session_id);
    }

    let mut receivers = Vec::with_capacity(awaited_ids.len());
    for request_id in awaited_ids {
        receivers.push(state.register_json_sync(session_id, request_id));
    }

    let mut responses = Vec::with_capacity(receivers.len());
    for rx in receivers {
        match tokio::time::timeout(state.config.request_timeout, rx).await {
            Ok(Ok(value)) => responses.push(value),
            Ok(Err(_)) => warn!("pending json-sync slot dropped without a response"),
            Err(_) => warn!("json-sync request timed out waiting for dispatcher"),
        }
    }

    let body = if responses.len() == 1 {
        responses.into_iter().next().unwrap()
    } else {
        Value::Array(responses)
    };

    with_session_header(axum::Json(body).into_response(), session_id)
}

fn post_json_async_response(
    state: &std::sync::Arc<StreamableHttpState>,
    session_id: &str,
    awaited_ids: &[RequestId],
) -> Response {
    if awaited_ids.is_empty() {
        return with_session_header(StatusCode::ACCEPTED.into_response(), session_id);
    }

    // JSON-async is modeled around one outstanding id per poll URL; for a
    // batch we register every id but only the first is directly pollable
    // via the Location header. The rest complete and are retained for a
    // direct poll by id, same as a standalone async request.
    for request_id in awaited_ids {
        state.register_json_async(session_id, request_id);
    }

    let first = &awaited_ids[0];
    let location = format!(
        "{}/responses/{}",
        state.config.endpoint_path.trim_end_matches('/'),
        first
    );

    let mut response = StatusCode::ACCEPTED.into_response();
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(axum::http::header::LOCATION, value);
    }
    with_session_header(response, session_id)
}

fn parse_error_response(
    state: &std::sync::Arc<StreamableHttpState>,
    provided_session: Option<&str>,
) -> Response {
    let error_body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": { "code": -32700, "message": "Parse error" },
    });
    let (session_id, _) = state.resolve_session(provided_session);
    with_session_header(
        (StatusCode::BAD_REQUEST, axum::Json(error_body)).into_response(),
        &session_id,
    )
}

fn invalid_token_response(
    state: &std::sync::Arc<StreamableHttpState>,
    provided_session: Option<&str>,
) -> Response {
    let error_body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": { "code": -32104, "message": "Unauthorized" },
    });
    let (session_id, _) = state.resolve_session(provided_session);
    with_session_header(
        (StatusCode::UNAUTHORIZED, axum::Json(error_body)).into_response(),
        &session_id,
    )
}

/// `GET <endpoint>`: opens (or replaces) the session's standalone SSE stream.
pub(crate) async fn get_handler(
    State(state): State<std::sync::Arc<StreamableHttpState>>,
    headers: HeaderMap,
) -> Response {
    if !state.config.enable_get_stream {
        let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
        if let Ok(value) = HeaderValue::from_str("POST, OPTIONS, DELETE") {
            response.headers_mut().insert(axum::http::header::ALLOW, value);
        }
        return response;
    }

    let Some(provided) = session_header(&headers) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if state.is_terminated(provided) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let (session_id, _) = state.resolve_session(Some(provided));

    let replay = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|last_id| state.replay_since(&session_id, last_id))
        .unwrap_or_default();

    let (tx, rx) = mpsc::unbounded_channel::<SseEvent>();
    state.register_get_stream(&session_id, tx);

    let replay_stream = futures::stream::iter(replay.into_iter().map(to_sse_item));
    let live_stream = tokio_stream_from_receiver(rx).map(to_sse_item);
    let sse = Sse::new(replay_stream.chain(live_stream))
        .keep_alive(KeepAlive::new().interval(state.config.keep_alive).text("keepalive"));
    with_session_header(sse.into_response(), &session_id)
}

/// `DELETE <endpoint>`: terminates a session. Subsequent requests for it 404.
pub(crate) async fn delete_handler(
    State(state): State<std::sync::Arc<StreamableHttpState>>,
    headers: HeaderMap,
) -> StatusCode {
    let Some(session_id) = session_header(&headers) else {
        return StatusCode::BAD_REQUEST;
    };
    if state.is_terminated(session_id) {
        return StatusCode::NOT_FOUND;
    }
    state.terminate_session(session_id).await;
    StatusCode::NO_CONTENT
}

/// `OPTIONS <endpoint>`: CORS preflight / capability probe.
pub(crate) async fn options_handler() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Ok(value) = HeaderValue::from_str("POST, GET, DELETE, OPTIONS") {
        response.headers_mut().insert(axum::http::header::ALLOW, value);
    }
    response
}

/// `GET <endpoint>/responses/:request_id`: JSON-async polling endpoint.
pub(crate) async fn poll_async_handler(
    State(state): State<std::sync::Arc<StreamableHttpState>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = session_header(&headers) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if let Some(value) = state.take_async_response(session_id, &request_id) {
        return axum::Json(value).into_response();
    }
    if state.has_pending_async(session_id, &request_id) {
        return StatusCode::NO_CONTENT.into_response();
    }
    StatusCode::NOT_FOUND.into_response()
}

fn tokio_stream_from_receiver(
    rx: mpsc::UnboundedReceiver<SseEvent>,
) -> impl Stream<Item = SseEvent> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::{HeaderMap, HeaderValue};

    use super::config::StreamableHttpConfig;
    use super::*;
    use crate::oauth::{TokenInfo, TokenValidator};

    struct OnlyAccepts(&'static str);
    impl TokenValidator for OnlyAccepts {
        fn validate(&self, token: &str) -> Option<TokenInfo> {
            (token == self.0).then(|| TokenInfo {
                client_id: "client-1".to_string(),
                scopes: vec![],
            })
        }
    }

    fn headers_with_bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn invalid_bearer_token_is_rejected_before_body_is_parsed() {
        let state = Arc::new(StreamableHttpState::new(StreamableHttpConfig::default()));
        state.set_auth_validator(Arc::new(OnlyAccepts("good-token")));

        // Body is not even valid JSON: if parsing ran first this would come
        // back as a -32700 parse error instead of -32104 unauthorized.
        let response = post_handler(
            State(state),
            headers_with_bearer("bad-token"),
            Bytes::from_static(b"not json at all"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_bearer_token_allows_request_through_to_parsing() {
        let state = Arc::new(StreamableHttpState::new(StreamableHttpConfig::default()));
        state.set_auth_validator(Arc::new(OnlyAccepts("good-token")));

        let response = post_handler(
            State(state),
            headers_with_bearer("good-token"),
            Bytes::from_static(b"not json at all"),
        )
        .await;

        // Gets past the token check and fails at parsing instead.
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn absent_token_is_not_rejected_at_this_layer() {
        let state = Arc::new(StreamableHttpState::new(StreamableHttpConfig::default()));
        state.set_auth_validator(Arc::new(OnlyAccepts("good-token")));

        let response = post_handler(State(state), HeaderMap::new(), Bytes::from_static(b"not json at all")).await;

        // No token presented: falls through to the dispatcher's per-method
        // exemption logic rather than being rejected here.
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
