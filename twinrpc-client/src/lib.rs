//! JSON-RPC 2.0 client over a socket or HTTP
//!
//! This crate provides a JSON-RPC 2.0 client that speaks over two
//! interchangeable transports: a persistent WebSocket and plain HTTP POST.
//! Callers get the same `call` / `notify` / `batch` interface whichever one
//! carries the traffic.
//!
//! # Core Features
//!
//! - **Transport Selection**: the socket whenever one can be obtained, HTTP
//!   otherwise, decided per call
//! - **Lazy Socket**: opened on first use, recreated after it closes, with
//!   outbound frames queued while it connects
//! - **Correlation**: responses matched to calls by id, in any order
//! - **Batches**: one HTTP exchange or one frame per entry, results
//!   reassembled in request order
//! - **Hooks**: server pushes and socket lifecycle events
//! - **Observability**: OpenTelemetry integration for traces and metrics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use twinrpc_client::ClientBuilder;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new()
//!         .socket_endpoint("ws://localhost:8080/rpc")
//!         .http_endpoint("http://localhost:8080/rpc")
//!         .on_unrecognized_message(|frame| async move {
//!             println!("push: {}", frame);
//!         })
//!         .build()?;
//!
//!     let sum: i64 = client.request("add", json!([2, 3])).await?;
//!     println!("2 + 3 = {}", sum);
//!
//!     client.notify("log", json!({"level": "info", "msg": "hello"}))?;
//!     Ok(())
//! }
//! ```

mod batch;
mod client;
mod client_builder;
mod connection;
mod dispatcher;
mod hooks;
mod http;
mod metrics;
mod request;
mod socket;
mod transport;

pub use batch::{BatchContext, BatchHandle, BatchResult};
pub use client::TwinClient;
pub use client_builder::ClientBuilder;
pub use connection::{ConnectionState, SendDisposition, SocketConnectionManager};
pub use dispatcher::{Dispatch, ResponseDispatcher};
pub use hooks::{EventHookFn, HookFuture, SocketHooks, TextHookFn};
pub use http::{HttpReply, HttpTransport, ReqwestTransport};
pub use metrics::ClientMetrics;
pub use request::{Continuation, IdAllocator, PendingCall, PendingCallRegistry, PendingResponse};
pub use socket::{SocketEvent, SocketEventSink, SocketLink, SocketSupplier, WebSocketSupplier};
pub use transport::{select_transport, TransportKind};
