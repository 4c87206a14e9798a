//! Codec for JSON-RPC message serialization and deserialization
//!
//! Outbound messages are encoded compactly with the field order
//! `jsonrpc, method, params, id`. Inbound data is decoded in two steps: first
//! into a generic `serde_json::Value`, then classified. The split lets the
//! client hand anything that is not a JSON-RPC response to a fallback handler
//! without ever treating it as a protocol error.
//!
//! # Examples
//!
//! ```rust
//! use twinrpc_core::{codec, JsonRpcRequest, Params, Id};
//!
//! let request = JsonRpcRequest::new("ping", Params::empty(), Id::Number(1));
//! let json = codec::encode_request(&request).unwrap();
//! assert_eq!(json, r#"{"jsonrpc":"2.0","method":"ping","params":[],"id":1}"#);
//!
//! let value = codec::decode_value(r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#).unwrap();
//! let response = codec::decode_response(value).unwrap();
//! assert_eq!(response.result, Some(serde_json::json!("pong")));
//! ```

use crate::error::{Error, JsonRpcErrorData, Result};
use crate::types::{
    JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION,
};
use serde::Serialize;
use serde_json::Value;

/// Encode any serializable message to a JSON string
///
/// # Errors
///
/// Returns `Error::Serialization` if the message cannot be serialized.
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Encode a JSON-RPC request to JSON
pub fn encode_request(req: &JsonRpcRequest) -> Result<String> {
    encode(req)
}

/// Encode a JSON-RPC notification to JSON
pub fn encode_notification(notif: &JsonRpcNotification) -> Result<String> {
    encode(notif)
}

/// Encode a batch as a single JSON array
///
/// Entries keep the order in which they were added to the batch.
///
/// ```rust
/// use twinrpc_core::{codec, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, Params, Id};
///
/// let batch: Vec<JsonRpcMessage> = vec![
///     JsonRpcRequest::new("a", Params::empty(), Id::Number(1)).into(),
///     JsonRpcNotification::new("b", Params::empty()).into(),
/// ];
/// let json = codec::encode_batch(&batch).unwrap();
/// assert_eq!(
///     json,
///     r#"[{"jsonrpc":"2.0","method":"a","params":[],"id":1},{"jsonrpc":"2.0","method":"b","params":[]}]"#
/// );
/// ```
pub fn encode_batch(messages: &[JsonRpcMessage]) -> Result<String> {
    encode(&messages)
}

/// Decode raw data into a generic JSON value
///
/// # Errors
///
/// Returns `Error::JsonRpc` carrying a parse error (-32700) if the data is
/// not valid JSON.
pub fn decode_value(data: &str) -> Result<Value> {
    serde_json::from_str(data).map_err(|_e| Error::JsonRpc(JsonRpcErrorData::parse_error()))
}

/// Classify a decoded value as a JSON-RPC response
///
/// Returns `Some` only for an object whose `jsonrpc` tag is exactly `"2.0"`
/// and which carries a `result` or an `error` member. Everything else,
/// including requests and notifications pushed by a server, yields `None`.
pub fn decode_response(value: Value) -> Option<JsonRpcResponse> {
    let object = value.as_object()?;
    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return None;
    }
    if !object.contains_key("result") && !object.contains_key("error") {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Decode an HTTP batch reply into its individual items
///
/// A JSON array is returned item by item, unparsed. A lone object (servers
/// answer with a single error object when the whole batch is rejected) is
/// returned as a one-element list.
///
/// # Errors
///
/// - `Error::JsonRpc(ParseError)` if the data is not valid JSON
/// - `Error::Serialization` if the value is neither an array nor an object
pub fn decode_batch_response(data: &str) -> Result<Vec<Value>> {
    match decode_value(data)? {
        Value::Array(items) => Ok(items),
        object @ Value::Object(_) => Ok(vec![object]),
        other => Err(Error::Serialization(format!(
            "Expected a batch response array, got {}",
            other
        ))),
    }
}
