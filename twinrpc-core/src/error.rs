//! Error types for twinrpc
//!
//! This module provides the error taxonomy shared by every twinrpc crate.
//! It defines three types:
//!
//! - **Error**: Client-side error delivered to callers (uses thiserror)
//! - **JsonRpcErrorData**: The `error` object of a JSON-RPC 2.0 response
//! - **HttpErrorPayload**: Body of a failed HTTP exchange, parsed when possible
//!
//! # Error Categories
//!
//! - **Dispatch errors**: `TransportUnavailable` is raised synchronously when
//!   neither transport can carry a call.
//! - **Transport errors**: `HttpTransport`, `WebSocket`, `ConnectionClosed`
//! - **Protocol errors**: `JsonRpc` carries the server's `error` object verbatim
//! - **Local errors**: `Serialization`, `InvalidParams`, `DuplicateId`,
//!   `NoResponse`, `Internal`
//!
//! Unroutable responses and malformed inbound frames are deliberately absent:
//! they never reach a caller and are forwarded to the fallback message handler.
//!
//! # Standard Error Codes
//!
//! JSON-RPC 2.0 defines standard error codes:
//! - `-32700`: Parse error (invalid JSON)
//! - `-32600`: Invalid request (missing required fields)
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `-32000 to -32099`: Server error (implementation-defined)
//!
//! # Examples
//!
//! ```rust
//! use twinrpc_core::{Error, JsonRpcErrorData};
//!
//! let error = Error::JsonRpc(JsonRpcErrorData::new(-32601, "Method not found"));
//! assert!(error.is_protocol_error());
//! ```

use crate::types::Id;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for twinrpc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Standard JSON-RPC 2.0 error codes
pub mod codes {
    /// Invalid JSON was received
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist / is not available
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameter(s)
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Client-side error type for twinrpc operations
///
/// Every per-call failure is local to that call: it is delivered through the
/// call's own `PendingResponse` and never affects other in-flight calls. The
/// one exception is an HTTP-transport failure of a batch exchange, which fails
/// every call in that exchange.
///
/// The type is `Clone` so a single transport failure can be fanned out to all
/// entries of a batch.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Neither a socket nor an HTTP transport could be resolved for this call
    ///
    /// Raised synchronously from `call`, `notify` and batch execution. No
    /// network interaction takes place.
    #[error("No transport available: neither a socket nor an HTTP endpoint is usable")]
    TransportUnavailable,

    /// The HTTP exchange itself failed
    ///
    /// `status` is `None` when no HTTP status was ever received (for example
    /// the connection was refused). The payload holds the server's JSON-RPC
    /// error object when the body could be parsed as one, otherwise the raw
    /// response text.
    #[error("HTTP transport error (status {status:?}): {payload}")]
    HttpTransport {
        /// HTTP status code, if one was received
        status: Option<u16>,
        /// Parsed or opaque error body
        payload: HttpErrorPayload,
    },

    /// JSON-RPC protocol error reported by the server
    ///
    /// Delivered verbatim from the response's `error` field. The client never
    /// interprets or retries these.
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcErrorData),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Call parameters were not a JSON array or object
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// WebSocket transport layer error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The socket connection closed before a response arrived
    ///
    /// Only produced when the client is configured to fail pending calls on
    /// close, or when a frame could not be handed to a dead connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A request id was registered twice
    #[error("Request id {0} is already pending")]
    DuplicateId(Id),

    /// The call's continuation was dropped without ever being resolved
    #[error("No response was received for this call")]
    NoResponse,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error was reported by the server as a JSON-RPC error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::JsonRpc(_))
    }

    /// Returns true if this error originates in a transport rather than the server
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Error::TransportUnavailable
                | Error::HttpTransport { .. }
                | Error::WebSocket(_)
                | Error::ConnectionClosed
        )
    }

    /// Short, stable label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Error::TransportUnavailable => "transport_unavailable",
            Error::HttpTransport { .. } => "http_transport",
            Error::JsonRpc(_) => "json_rpc",
            Error::Serialization(_) => "serialization",
            Error::InvalidParams(_) => "invalid_params",
            Error::WebSocket(_) => "websocket",
            Error::ConnectionClosed => "connection_closed",
            Error::DuplicateId(_) => "duplicate_id",
            Error::NoResponse => "no_response",
            Error::Internal(_) => "internal",
        }
    }
}

/// Body of a failed HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub enum HttpErrorPayload {
    /// The body decoded to a JSON-RPC response carrying an `error` object
    Rpc(JsonRpcErrorData),
    /// The body was not a JSON-RPC error; the raw text is kept as-is
    Opaque(String),
}

impl std::fmt::Display for HttpErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpErrorPayload::Rpc(error) => write!(f, "{}", error),
            HttpErrorPayload::Opaque(text) => write!(f, "{}", text),
        }
    }
}

/// The `error` member of a JSON-RPC 2.0 response
///
/// Carried to callers exactly as the server sent it: `code` and `message`
/// are required on the wire, `data` is optional and opaque.
///
/// ```rust
/// use twinrpc_core::JsonRpcErrorData;
/// use serde_json::json;
///
/// let quota = JsonRpcErrorData::with_data(
///     -32010,
///     "Quota exceeded",
///     json!({"limit": 100, "used": 100})
/// );
/// assert_eq!(quota.to_string(), "[-32010] Quota exceeded");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Error code chosen by the server
    pub code: i32,

    /// Short description
    pub message: String,

    /// Server-defined detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcErrorData {
    /// Error with no `data`
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Error carrying `data`
    pub fn with_data(code: i32, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Build an error object from an arbitrary JSON value
    ///
    /// Servers do not always send conforming error objects. A value that is not
    /// `{code, message, data?}` is kept whole in `data` under an internal-error
    /// code so the caller still sees exactly what the server sent.
    ///
    /// ```rust
    /// use twinrpc_core::JsonRpcErrorData;
    /// use serde_json::json;
    ///
    /// let conforming = JsonRpcErrorData::from_value(json!({"code": -32000, "message": "busy"}));
    /// assert_eq!(conforming.code, -32000);
    ///
    /// let odd = JsonRpcErrorData::from_value(json!("something broke"));
    /// assert_eq!(odd.data, Some(json!("something broke")));
    /// ```
    pub fn from_value(value: serde_json::Value) -> Self {
        match serde_json::from_value::<JsonRpcErrorData>(value.clone()) {
            Ok(error) => error,
            Err(_) => Self::with_data(codes::INTERNAL_ERROR, "Malformed error object", value),
        }
    }

    /// Error for a frame that is not valid JSON (-32700)
    pub fn parse_error() -> Self {
        Self::new(codes::PARSE_ERROR, "Parse error")
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
