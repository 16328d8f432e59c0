//! JSON-RPC 2.0 wire types and receive-side classification
//!
//! This module defines the three message shapes that travel over a
//! [`crate::transport::Transport`] (requests, responses, and notifications)
//! plus the error object carried inside failed responses. All types derive
//! `Debug`, `Clone`, `Serialize`, and `Deserialize`; `Option<>` fields omit
//! their key from JSON when `None` via
//! `#[serde(skip_serializing_if = "Option::is_none")]`.
//!
//! The sole receive-side discriminator between a [`Response`] and a
//! [`Notification`] is the presence of the `id` field: [`Message::decode`]
//! classifies an inbound frame without committing to a full decode first.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// The protocol version tag carried by every message; always `"2.0"`.
pub const JSONRPC_VERSION: &str = "2.0";

/// Built-in method: return the full prompt mapping.
pub const METHOD_LIST_PROMPTS: &str = "listPrompts";
/// Built-in method: look up one prompt by name.
pub const METHOD_GET_PROMPT: &str = "getPrompt";
/// Built-in method: dispatch to a named resource handler.
pub const METHOD_GET_RESOURCE: &str = "getResource";
/// Built-in method: dispatch to a named tool handler.
pub const METHOD_EXECUTE_TOOL: &str = "executeTool";

// ---------------------------------------------------------------------------
// Error codes (standard JSON-RPC code space, all negative)
// ---------------------------------------------------------------------------

/// Inbound payload was not well-formed JSON.
pub const PARSE_ERROR: i64 = -32700;
/// Well-formed payload but wrong protocol version tag.
pub const INVALID_REQUEST: i64 = -32600;
/// No handler bound to the method name.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// A bound handler returned a failure.
pub const APPLICATION_ERROR: i64 = -32000;

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request object.
///
/// `id` is caller-chosen and echoed verbatim by the responder. A request
/// with no `id` is a notification; use [`Notification`] for clarity.
///
/// # Examples
///
/// ```
/// use tandem_rpc::types::{Request, JSONRPC_VERSION};
///
/// let req = Request {
///     jsonrpc: JSONRPC_VERSION.to_string(),
///     method: "getPrompt".to_string(),
///     params: Some(serde_json::json!({"name": "greeting"})),
///     id: serde_json::json!(1),
/// };
/// assert_eq!(req.jsonrpc, "2.0");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version tag; always `"2.0"`.
    pub jsonrpc: String,
    /// The method name to invoke.
    pub method: String,
    /// Optional method parameters, opaque to the dispatch layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Request correlation identifier; echoed verbatim in the response.
    pub id: serde_json::Value,
}

/// A JSON-RPC 2.0 response object.
///
/// A valid response carries exactly one of `result` or `error`. The `id`
/// mirrors the request's; it is JSON `null` when the request's identifier
/// could not be read (parse errors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version tag; always `"2.0"`.
    pub jsonrpc: String,
    /// Successful result value; mutually exclusive with `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error object; mutually exclusive with `result`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// Mirrors the `id` of the corresponding request; JSON null if unknown.
    pub id: serde_json::Value,
}

impl Response {
    /// Build a success response echoing `id`.
    ///
    /// A `None` result produces a response with no `result` field, used by
    /// handlers that complete without a payload.
    pub fn success(id: serde_json::Value, result: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
            error: None,
            id,
        }
    }

    /// Build an error response echoing `id` (JSON null when the request's
    /// identifier was unreadable).
    pub fn failure(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// A JSON-RPC 2.0 notification: a one-way message with no `id` and
/// therefore no expected response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Protocol version tag; always `"2.0"`.
    pub jsonrpc: String,
    /// The notification method name.
    pub method: String,
    /// Optional notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// A JSON-RPC 2.0 error object.
///
/// Implements `Display` as `"RPC error {code}: {message}"`.
///
/// # Examples
///
/// ```
/// use tandem_rpc::types::RpcError;
///
/// let e = RpcError { code: -32600, message: "Invalid Request".to_string(), data: None };
/// assert_eq!(e.to_string(), "RPC error -32600: Invalid Request");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    /// Numeric error code; negative by convention.
    pub code: i64,
    /// Human-readable error description.
    pub message: String,
    /// Optional structured detail payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    /// Construct an error with no detail payload.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC error {}: {}", self.code, self.message)
    }
}

// ---------------------------------------------------------------------------
// Receive-side classification
// ---------------------------------------------------------------------------

/// A classified inbound frame.
///
/// Classification looks only at field presence: a frame that carries an
/// `id` is a [`Response`]; a frame with a `method` but no `id` is a
/// [`Notification`]. Anything else is undecodable.
#[derive(Debug, Clone)]
pub enum Message {
    /// A response to an earlier request on this connection.
    Response(Response),
    /// A one-way notification.
    Notification(Notification),
}

impl Message {
    /// Classify and decode one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if the frame is not well-formed JSON or
    /// matches neither wire shape.
    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if value.get("id").is_some() {
            serde_json::from_value(value).map(Message::Response)
        } else {
            serde_json::from_value(value).map(Message::Notification)
        }
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// A named template string owned by the server.
///
/// Prompts are pure data: the server stores and returns them verbatim, and
/// any template substitution happens on the consuming side.
///
/// # Examples
///
/// ```
/// use tandem_rpc::types::Prompt;
///
/// let p = Prompt { name: "test".to_string(), template: "Test {{value}}".to_string() };
/// let json = serde_json::to_string(&p).unwrap();
/// assert!(json.contains(r#""name":"test""#));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    /// Lookup key, unique per server.
    pub name: String,
    /// The raw template text.
    pub template: String,
}
