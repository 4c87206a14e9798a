//! Core JSON-RPC 2.0 types and codec for twinrpc
//!
//! This crate holds everything the client needs that is independent of a
//! transport:
//!
//! - **Types**: requests, notifications, responses and request ids
//! - **Codec**: compact encoding of outbound messages and classification of
//!   inbound frames
//! - **Error handling**: the error taxonomy surfaced to callers
//! - **Observability**: OpenTelemetry and `tracing` bootstrap
//!
//! The `twinrpc-client` crate builds the socket and HTTP transports on top.
//!
//! # Example
//!
//! ```rust
//! use twinrpc_core::{codec, Id, JsonRpcRequest, Params};
//! use serde_json::json;
//!
//! let params = Params::from_serializable(json!({"a": 5, "b": 3})).unwrap();
//! let request = JsonRpcRequest::new("add", params, Id::Number(1));
//!
//! let json = codec::encode_request(&request).unwrap();
//! assert!(json.starts_with(r#"{"jsonrpc":"2.0","method":"add""#));
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod types;

pub use error::{codes, Error, HttpErrorPayload, JsonRpcErrorData, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use types::{
    Id, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Params,
    JSONRPC_VERSION,
};
