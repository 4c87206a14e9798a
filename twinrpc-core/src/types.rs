//! JSON-RPC 2.0 types as used by the twinrpc client
//!
//! This module implements the wire structures from the JSON-RPC 2.0
//! specification (https://www.jsonrpc.org/specification):
//!
//! 1. **Request**: a call to a remote method that expects a response
//! 2. **Notification**: a call with no `id`, for which no response is expected
//! 3. **Response**: the result of processing a request (success or error)
//!
//! # Request IDs
//!
//! The client only ever issues positive integer ids, but responses are
//! decoded with the full `Id` type so that string or `null` ids sent back by
//! a server can be recognized as unroutable rather than rejected outright.
//!
//! # Params
//!
//! On the wire `params` is always present and is either an array or an
//! object. `Params` enforces that shape at construction time.

use crate::error::{Error, JsonRpcErrorData, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The protocol version tag carried by every message
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request ID
///
/// This enum uses `#[serde(untagged)]` to serialize directly as the inner
/// value, matching the wire format exactly. It implements `Hash` and `Eq` so
/// it can key the pending-call registry.
///
/// Decoding accepts integral floats such as `1.0` as `Id::Number`, since
/// some servers echo numeric ids back through a float representation.
///
/// # Examples
///
/// ```rust
/// use twinrpc_core::Id;
///
/// let id: Id = 42u64.into();
/// assert_eq!(id.to_string(), "42");
/// assert_eq!(id.as_u64(), Some(42));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric identifier - what this client issues
    Number(i64),
    /// String identifier - accepted from servers, never issued
    String(String),
    /// Null identifier - a server could not determine the request id
    Null,
}

impl Id {
    /// Returns the numeric value of a positive numeric id
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Id::Number(n) if *n >= 0 => Some(*n as u64),
            _ => None,
        }
    }
}

/// Largest magnitude at which every integer is exactly representable in an f64
const MAX_EXACT_FLOAT_ID: f64 = 9_007_199_254_740_992.0;

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error as _;

        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Id::Null),
            Value::String(s) => Ok(Id::String(s)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Id::Number(i));
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT_ID => {
                        Ok(Id::Number(f as i64))
                    }
                    _ => Err(D::Error::custom(format!("unsupported numeric id {}", n))),
                }
            }
            other => Err(D::Error::custom(format!(
                "id must be a number, string or null, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<u64> for Id {
    /// Casts to i64; the allocator never gets anywhere near `i64::MAX`.
    fn from(n: u64) -> Self {
        Id::Number(n as i64)
    }
}

/// Structured parameters of a request or notification
///
/// ```rust
/// use twinrpc_core::Params;
/// use serde_json::json;
///
/// let by_position = Params::from_serializable(json!([1, 2])).unwrap();
/// assert!(matches!(by_position, Params::Array(_)));
///
/// let by_name = Params::from_serializable(json!({"a": 1})).unwrap();
/// assert!(matches!(by_name, Params::Object(_)));
///
/// assert!(Params::from_serializable(7).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    /// Positional parameters
    Array(Vec<Value>),
    /// Named parameters
    Object(Map<String, Value>),
}

impl Params {
    /// Serialize any value into params
    ///
    /// `null` (for example `()`) becomes an empty positional list; other
    /// scalars are rejected with `Error::InvalidParams`.
    pub fn from_serializable<P: Serialize>(params: P) -> Result<Self> {
        let value = serde_json::to_value(params)?;
        Self::try_from(value)
    }

    /// An empty positional parameter list
    pub fn empty() -> Self {
        Params::Array(Vec::new())
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::empty()
    }
}

impl TryFrom<Value> for Params {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(Params::Array(items)),
            Value::Object(map) => Ok(Params::Object(map)),
            Value::Null => Ok(Params::empty()),
            other => Err(Error::InvalidParams(format!(
                "params must be an array or an object, got {}",
                other
            ))),
        }
    }
}

/// JSON-RPC 2.0 request message
///
/// Field order matches the wire order `jsonrpc, method, params, id`.
///
/// # Examples
///
/// ```rust
/// use twinrpc_core::{JsonRpcRequest, Params, Id};
///
/// let request = JsonRpcRequest::new("ping", Params::empty(), Id::Number(1));
/// assert_eq!(request.jsonrpc, "2.0");
/// assert_eq!(
///     serde_json::to_string(&request).unwrap(),
///     r#"{"jsonrpc":"2.0","method":"ping","params":[],"id":1}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version - always "2.0"
    pub jsonrpc: String,
    /// Name of the remote method to invoke
    pub method: String,
    /// Parameters passed to the method
    pub params: Params,
    /// Identifier correlating this request with its response
    pub id: Id,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request
    pub fn new(method: impl Into<String>, params: Params, id: Id) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// JSON-RPC 2.0 notification message
///
/// A notification has no `id` and the server must not answer it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version - always "2.0"
    pub jsonrpc: String,
    /// Name of the method/event being notified
    pub method: String,
    /// Parameters passed to the method
    pub params: Params,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC 2.0 notification
    pub fn new(method: impl Into<String>, params: Params) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message
///
/// Exactly one of `result` / `error` is present. A `result` of JSON `null`
/// is a legitimate success and deserializes to `Some(Value::Null)`; only an
/// absent field yields `None`.
///
/// # Examples
///
/// ```rust
/// use twinrpc_core::{JsonRpcResponse, Id};
///
/// let response: JsonRpcResponse =
///     serde_json::from_str(r#"{"jsonrpc":"2.0","id":3,"result":null}"#).unwrap();
/// assert!(response.is_success());
/// assert_eq!(response.id, Id::Number(3));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version - always "2.0"
    pub jsonrpc: String,
    /// Request ID from the original request, or null
    #[serde(default = "null_id")]
    pub id: Id,
    /// The result of the method invocation (present only on success)
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Error information (present only on failure)
    #[serde(
        default,
        deserialize_with = "lenient_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<JsonRpcErrorData>,
}

fn null_id() -> Id {
    Id::Null
}

// Wraps whatever is present, including `null`, so that `"result": null`
// is distinguishable from a missing field.
fn present_value<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn lenient_error<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<JsonRpcErrorData>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| Some(JsonRpcErrorData::from_value(value)))
}

impl JsonRpcResponse {
    /// Create a successful JSON-RPC 2.0 response
    pub fn success(result: Value, id: Id) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error JSON-RPC 2.0 response
    pub fn error(error: JsonRpcErrorData, id: Id) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Check if the response represents a successful result
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    /// Check if the response represents an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Collapse the response into the two-armed outcome delivered to callers
    ///
    /// A response carrying both fields resolves as a success, matching the
    /// order in which the dispatcher inspects them.
    pub fn into_outcome(self) -> Result<Value> {
        match (self.result, self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(Error::JsonRpc(error)),
            (None, None) => Err(Error::Internal(
                "Response carries neither result nor error".to_string(),
            )),
        }
    }
}

/// Any single outbound or inbound JSON-RPC message
///
/// Used mainly to encode the mixed request/notification arrays of a batch.
/// Untagged, so each variant serializes exactly as its inner type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// A request message (expects a response)
    Request(JsonRpcRequest),
    /// A notification message (no response expected)
    Notification(JsonRpcNotification),
    /// A response message
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// The id this message expects a response for, if any
    pub fn request_id(&self) -> Option<&Id> {
        match self {
            JsonRpcMessage::Request(request) => Some(&request.id),
            _ => None,
        }
    }

    /// The method name, for requests and notifications
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcMessage::Request(request) => Some(&request.method),
            JsonRpcMessage::Notification(notification) => Some(&notification.method),
            JsonRpcMessage::Response(_) => None,
        }
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(request: JsonRpcRequest) -> Self {
        JsonRpcMessage::Request(request)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(notification: JsonRpcNotification) -> Self {
        JsonRpcMessage::Notification(notification)
    }
}
