//! Control protocol wire shapes: frame classification, request parsing and
//! response envelope construction.

use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{PermissionUpdate, RequestId};

// ============================================================================
// Classification
// ============================================================================

/// What an inbound frame is, judged by its top-level `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Request from the Agent that the SDK must answer
    ControlRequest,
    /// Response to a request the SDK issued
    ControlResponse,
    /// Cancellation notice for a pending callback (logged, ignored in v1)
    ControlCancel,
    /// Anything else: a conversation message
    Conversation,
}

/// Classify a parsed frame.
#[must_use]
pub fn classify(frame: &Value) -> FrameKind {
    match frame.get("type").and_then(Value::as_str) {
        Some("control_request") => FrameKind::ControlRequest,
        Some("control_response") => FrameKind::ControlResponse,
        Some("control_cancel_request") => FrameKind::ControlCancel,
        _ => FrameKind::Conversation,
    }
}

// ============================================================================
// Inbound requests
// ============================================================================

/// Inbound control request envelope
#[derive(Debug, Clone, Deserialize)]
pub struct InboundControlRequest {
    /// Request ID to echo in the response
    #[serde(default)]
    pub request_id: Option<RequestId>,
    /// Subtype-specific payload
    #[serde(default)]
    pub request: Value,
}

impl InboundControlRequest {
    /// The request's subtype, when present.
    #[must_use]
    pub fn subtype(&self) -> Option<&str> {
        self.request.get("subtype").and_then(Value::as_str)
    }
}

/// Payload of a `can_use_tool` request
#[derive(Debug, Clone, Deserialize)]
pub struct CanUseToolRequest {
    /// Tool requesting permission
    pub tool_name: String,
    /// Tool input, opaque JSON
    #[serde(default)]
    pub input: Value,
    /// Suggested permission updates
    #[serde(default)]
    pub suggestions: Vec<PermissionUpdate>,
    /// Path that was blocked, if applicable
    #[serde(default)]
    pub blocked_path: Option<String>,
}

/// Payload of a `hook_callback` request
#[derive(Debug, Clone, Deserialize)]
pub struct HookCallbackRequest {
    /// Registered callback ID (`<Event>_callback`)
    #[serde(default)]
    pub callback_id: String,
    /// Event name, when the Agent sends it alongside the callback ID
    #[serde(default)]
    pub event: Option<String>,
    /// Hook input; embeds the event name and tool/prompt details
    #[serde(default)]
    pub input: Value,
}

/// Payload of an `mcp_message` request.
///
/// Two envelope conventions exist in the wild: the JSON-RPC body nested
/// under `message`, or `method`/`params` inlined next to `server_name`.
/// Both are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct McpMessageRequest {
    /// Target server name
    pub server_name: String,
    /// Nested JSON-RPC body (`{method, params}`)
    #[serde(default)]
    pub message: Option<Value>,
    /// Inlined method
    #[serde(default)]
    pub method: Option<String>,
    /// Inlined params
    #[serde(default)]
    pub params: Option<Value>,
}

impl McpMessageRequest {
    /// Extract `(method, params)` from whichever envelope form was used.
    #[must_use]
    pub fn rpc(&self) -> (String, Value) {
        if let Some(ref message) = self.message {
            let method = message
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let params = message.get("params").cloned().unwrap_or(Value::Null);
            (method, params)
        } else {
            (
                self.method.clone().unwrap_or_default(),
                self.params.clone().unwrap_or(Value::Null),
            )
        }
    }
}

// ============================================================================
// Inbound responses
// ============================================================================

/// Inner object of an inbound `control_response` frame
#[derive(Debug, Clone, Deserialize)]
pub struct InboundControlResponse {
    /// ID of the request this answers
    pub request_id: RequestId,
    /// `success` or `error`
    #[serde(default)]
    pub subtype: String,
    /// Response payload on success
    #[serde(default)]
    pub response: Value,
    /// Error message on failure
    #[serde(default)]
    pub error: Option<String>,
}

/// Parse the inner response out of a `control_response` frame.
#[must_use]
pub fn parse_control_response(frame: &Value) -> Option<InboundControlResponse> {
    frame
        .get("response")
        .and_then(|r| serde_json::from_value(r.clone()).ok())
}

// ============================================================================
// Outbound envelopes
// ============================================================================

/// Success envelope answering an inbound control request.
///
/// ```json
/// {"type":"control_response","response":{"subtype":"success","request_id":"…","response":{…}}}
/// ```
#[must_use]
pub fn success_response(request_id: &RequestId, payload: Value) -> Value {
    serde_json::json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": payload,
        }
    })
}

/// Error envelope answering an inbound control request.
#[must_use]
pub fn error_response(request_id: &RequestId, message: &str) -> Value {
    serde_json::json!({
        "type": "control_response",
        "response": {
            "subtype": "error",
            "request_id": request_id,
            "error": message,
        }
    })
}

/// Outbound control request envelope.
#[must_use]
pub fn control_request(request_id: &RequestId, request: Value) -> Value {
    serde_json::json!({
        "type": "control_request",
        "request_id": request_id,
        "request": request,
    })
}

// ============================================================================
// Request IDs
// ============================================================================

/// Generator of connection-unique outbound request IDs
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    counter: AtomicU64,
}

impl RequestIdGenerator {
    /// Next unique ID: a monotonic counter plus a timestamp-derived nonce.
    pub fn next(&self) -> RequestId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        RequestId::from(format!("req_{n}_{nonce:x}"))
    }
}
