//! JSON-RPC 2.0 envelope types: requests, responses, notifications, and
//! batches, plus the classification logic the dispatcher uses to tell them
//! apart on the wire.

use serde::{Deserialize, Serialize, Deserializer, Serializer};
use serde_json::Value;
use std::fmt;

use crate::error::{ErrorKind, McpError};
use crate::types::RequestId;

/// JSON-RPC version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Zero-sized marker serialized as the literal `"2.0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid jsonrpc version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// A JSON-RPC request: has both `method` and `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version marker
    pub jsonrpc: JsonRpcVersion,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request id; the dispatcher owes exactly one response carrying this id
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Build a request.
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC notification: has `method`, no `id`. Never produces a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol version marker
    pub jsonrpc: JsonRpcVersion,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// Response id — distinct from [`RequestId`] because parse-error responses
/// carry a `null` id per JSON-RPC 2.0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Option<RequestId>);

impl ResponseId {
    /// Wrap a concrete request id.
    #[must_use]
    pub fn from_request(id: RequestId) -> Self {
        Self(Some(id))
    }

    /// The `null` id used for parse errors.
    #[must_use]
    pub fn null() -> Self {
        Self(None)
    }

    /// Borrow the inner request id, if any.
    #[must_use]
    pub fn as_request_id(&self) -> Option<&RequestId> {
        self.0.as_ref()
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    /// Numeric error code
    pub code: i32,
    /// Human-readable message
    pub message: String,
    /// Structured extra data (e.g. `retry_after`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&McpError> for JsonRpcErrorObject {
    fn from(err: &McpError) -> Self {
        let mut data = serde_json::Map::new();
        if let Some(retry_after) = err.retry_after {
            data.insert("retry_after".into(), Value::from(retry_after));
        }
        if let Some(trace_id) = &err.trace_id {
            data.insert("trace_id".into(), Value::from(trace_id.clone()));
        }
        Self {
            code: err.kind.code(),
            message: err.message.clone(),
            data: if data.is_empty() { None } else { Some(Value::Object(data)) },
        }
    }
}

impl From<McpError> for JsonRpcErrorObject {
    fn from(err: McpError) -> Self {
        Self::from(&err)
    }
}

/// The result-or-error payload of a response. `#[serde(untagged)]` ensures
/// exactly one of `result`/`error` is ever (de)serialized, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    /// Successful result
    Success {
        /// Result value
        result: Value,
    },
    /// Error result
    Error {
        /// Error object
        error: JsonRpcErrorObject,
    },
}

/// A JSON-RPC response: has `id` and exactly one of `result`/`error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version marker
    pub jsonrpc: JsonRpcVersion,
    /// Result or error payload
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
    /// Id this response answers (`null` for parse errors)
    pub id: ResponseId,
}

impl JsonRpcResponse {
    /// Build a successful response.
    #[must_use]
    pub fn success(result: Value, id: RequestId) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Success { result },
            id: ResponseId::from_request(id),
        }
    }

    /// Build an error response for a known request id.
    #[must_use]
    pub fn error(err: &McpError, id: RequestId) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error: err.into() },
            id: ResponseId::from_request(id),
        }
    }

    /// Build a parse-error response; per JSON-RPC 2.0 its id is `null`.
    #[must_use]
    pub fn parse_error(message: impl Into<String>) -> Self {
        let err = McpError::new(ErrorKind::ParseError, message);
        Self {
            jsonrpc: JsonRpcVersion,
            payload: JsonRpcResponsePayload::Error { error: (&err).into() },
            id: ResponseId::null(),
        }
    }

    /// `true` if this response carries a result.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.payload, JsonRpcResponsePayload::Success { .. })
    }

    /// The request id this response answers, if not a parse error.
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> {
        self.id.as_request_id()
    }
}

/// One parsed envelope off the wire, before dispatch classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// A request (method + id)
    Request(JsonRpcRequest),
    /// A notification (method, no id)
    Notification(JsonRpcNotification),
    /// A response (id + result/error) — only seen when the server itself
    /// issued a server-initiated request (e.g. sampling) and awaits a
    /// client-delivered response.
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Classify a single already-parsed JSON value as request, notification,
    /// or response: request = method+id; notification = method, no id;
    /// response = id + (result|error).
    pub fn classify(value: Value) -> Result<Self, McpError> {
        let obj = value.as_object().ok_or_else(|| {
            McpError::new(ErrorKind::InvalidRequest, "envelope must be a JSON object")
        })?;

        if obj.contains_key("method") {
            if obj.contains_key("id") {
                let request: JsonRpcRequest = serde_json::from_value(Value::Object(obj.clone()))
                    .map_err(|e| McpError::new(ErrorKind::InvalidRequest, e.to_string()))?;
                Ok(Self::Request(request))
            } else {
                let notification: JsonRpcNotification =
                    serde_json::from_value(Value::Object(obj.clone()))
                        .map_err(|e| McpError::new(ErrorKind::InvalidRequest, e.to_string()))?;
                Ok(Self::Notification(notification))
            }
        } else if obj.contains_key("result") || obj.contains_key("error") {
            let response: JsonRpcResponse = serde_json::from_value(Value::Object(obj.clone()))
                .map_err(|e| McpError::new(ErrorKind::InvalidRequest, e.to_string()))?;
            Ok(Self::Response(response))
        } else {
            Err(McpError::new(
                ErrorKind::InvalidRequest,
                "envelope has neither method nor result/error",
            ))
        }
    }
}

impl fmt::Display for JsonRpcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(r) => write!(f, "request({}, id={})", r.method, r.id),
            Self::Notification(n) => write!(f, "notification({})", n.method),
            Self::Response(r) => write!(f, "response(id={:?})", r.id.0),
        }
    }
}

/// Parses a raw JSON-RPC payload, which may be a single envelope or a batch
/// array. An empty batch array is itself an Invalid Request.
pub fn parse_payload(raw: &Value) -> Result<Vec<Value>, McpError> {
    match raw {
        Value::Array(items) => {
            if items.is_empty() {
                Err(McpError::new(ErrorKind::InvalidRequest, "empty batch"))
            } else {
                Ok(items.clone())
            }
        }
        Value::Object(_) => Ok(vec![raw.clone()]),
        _ => Err(McpError::new(
            ErrorKind::InvalidRequest,
            "payload must be an object or array",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_request() {
        let value = json!({"jsonrpc":"2.0","method":"tools/list","id":1});
        match JsonRpcMessage::classify(value).unwrap() {
            JsonRpcMessage::Request(r) => assert_eq!(r.method, "tools/list"),
            other => panic!("expected request, got {other}"),
        }
    }

    #[test]
    fn classifies_notification() {
        let value = json!({"jsonrpc":"2.0","method":"notifications/initialized"});
        assert!(matches!(
            JsonRpcMessage::classify(value).unwrap(),
            JsonRpcMessage::Notification(_)
        ));
    }

    #[test]
    fn classifies_response() {
        let value = json!({"jsonrpc":"2.0","id":"s-1","result":{}});
        assert!(matches!(
            JsonRpcMessage::classify(value).unwrap(),
            JsonRpcMessage::Response(_)
        ));
    }

    #[test]
    fn rejects_envelope_missing_method_and_result() {
        let value = json!({"jsonrpc":"2.0"});
        assert!(JsonRpcMessage::classify(value).is_err());
    }

    #[test]
    fn parse_payload_rejects_empty_batch() {
        assert!(parse_payload(&json!([])).is_err());
    }

    #[test]
    fn parse_payload_accepts_single_object() {
        let items = parse_payload(&json!({"method":"ping"})).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn error_object_carries_retry_after() {
        let err = McpError::rate_limited(5);
        let obj: JsonRpcErrorObject = (&err).into();
        assert_eq!(obj.data.unwrap()["retry_after"], json!(5));
    }

    proptest::proptest! {
        /// A non-empty batch array always parses into exactly that many items.
        #[test]
        fn batch_parsing_preserves_item_count(n in 1usize..20) {
            let items: Vec<Value> = (0..n).map(|i| json!({"jsonrpc":"2.0","method":"ping","id":i})).collect();
            let parsed = parse_payload(&Value::Array(items.clone())).unwrap();
            proptest::prop_assert_eq!(parsed.len(), n);
            proptest::prop_assert_eq!(parsed, items);
        }

        /// A lone object always parses into a single-item vec containing itself.
        #[test]
        fn single_object_parses_to_one_item(id in 0i64..1000) {
            let value = json!({"jsonrpc":"2.0","method":"ping","id":id});
            let parsed = parse_payload(&value).unwrap();
            proptest::prop_assert_eq!(parsed, vec![value]);
        }
    }
}
