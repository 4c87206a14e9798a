//! twinrpc - JSON-RPC 2.0 over a socket or HTTP
//!
//! This is the main convenience crate that re-exports the twinrpc sub-crates.
//! Use this crate if you want a single dependency.
//!
//! # Architecture
//!
//! twinrpc is organized into modular crates:
//!
//! - **twinrpc-core**: wire types, codec, error handling, observability
//! - **twinrpc-client**: transport selection, socket lifecycle, call
//!   correlation, batches
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use twinrpc::ClientBuilder;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new()
//!         .socket_endpoint("ws://localhost:8080/rpc")
//!         .http_endpoint("http://localhost:8080/rpc")
//!         .build()?;
//!
//!     let result: serde_json::Value = client.request("add", json!({"a": 5, "b": 3})).await?;
//!     println!("Result: {}", result);
//!
//!     let mut batch = client.batch();
//!     batch.call("add", json!([1, 2]))?;
//!     batch.call("add", json!([3, 4]))?;
//!     for entry in batch.execute()?.await? {
//!         println!("{} -> {:?}", entry.id, entry.outcome);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Custom HTTP Transport
//!
//! Anything implementing [`client::HttpTransport`] can carry the HTTP
//! exchanges, which keeps a client testable without a server:
//!
//! ```rust
//! use async_trait::async_trait;
//! use serde::Deserialize;
//! use serde_json::json;
//! use twinrpc::client::{HttpReply, HttpTransport};
//! use twinrpc::{ClientBuilder, Error, TransportKind};
//!
//! #[derive(Debug, Deserialize, PartialEq)]
//! struct Sum {
//!     total: i64,
//! }
//!
//! /// Answers every `add` request with the sum of its params
//! struct Adder;
//!
//! #[async_trait]
//! impl HttpTransport for Adder {
//!     async fn post(
//!         &self,
//!         _endpoint: &str,
//!         _headers: &[(String, String)],
//!         body: String,
//!     ) -> twinrpc::Result<HttpReply> {
//!         let request: serde_json::Value = serde_json::from_str(&body)?;
//!         let total: i64 = request["params"]
//!             .as_array()
//!             .map(|params| params.iter().filter_map(|p| p.as_i64()).sum())
//!             .unwrap_or(0);
//!         let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": {"total": total}});
//!         Ok(HttpReply::new(200, reply.to_string()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new()
//!         .http_endpoint("http://adder.test/rpc")
//!         .http_transport(Adder)
//!         .build()?;
//!
//!     let pending = client.call("add", json!([2, 3]))?;
//!     assert_eq!(pending.transport(), Some(TransportKind::Http));
//!
//!     let sum: Sum = client.request("add", json!([40, 2])).await?;
//!     assert_eq!(sum, Sum { total: 42 });
//!     assert_eq!(pending.await?, json!({"total": 5}));
//!
//!     // Without any endpoint there is nothing to carry a call.
//!     let offline = ClientBuilder::new().build()?;
//!     assert!(matches!(offline.call("add", json!([1, 2])), Err(Error::TransportUnavailable)));
//!     Ok(())
//! }
//! ```

// Re-export all public APIs from sub-crates
pub use twinrpc_client as client;
pub use twinrpc_core as core;

// Convenience re-exports of the most commonly used types
pub use twinrpc_client::{ClientBuilder, TransportKind, TwinClient};
pub use twinrpc_core::{Error, Result};
