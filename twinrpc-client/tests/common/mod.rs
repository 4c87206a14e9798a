//! Common test utilities for twinrpc-client integration tests
//!
//! This module provides reusable fakes for both transports so client
//! behavior can be tested without a real server:
//!
//! - `MockWsServer`: a real WebSocket server on a random local port
//! - `ScriptedSupplier`: an in-memory socket whose lifecycle the test drives
//! - `RecordingHttpTransport`: canned HTTP replies, recorded requests

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use twinrpc_client::{HttpReply, HttpTransport, SocketEventSink, SocketLink, SocketSupplier};
use twinrpc_core::{Error, Result};

/// Route client logs to the test output; safe to call from every test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("twinrpc_client=debug")
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Await `future` for at most two seconds
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("timed out")
}

/// Helper to create a JSON-RPC success response
pub fn mock_response(id: i64, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id
    })
    .to_string()
}

/// Helper to create a JSON-RPC error response
pub fn mock_error_response(id: i64, code: i32, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message
        },
        "id": id
    })
    .to_string()
}

/// Helper to create a server-pushed notification
pub fn mock_notification(method: &str, params: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    })
    .to_string()
}

/// Answer every request with `f(method, params)`; notifications get no reply
pub fn rpc_handler<F>(f: F) -> impl Fn(String) -> Option<String> + Send + Sync + 'static
where
    F: Fn(&str, &Value) -> Value + Send + Sync + 'static,
{
    move |text| {
        let request: Value = serde_json::from_str(&text).ok()?;
        let id = request.get("id")?.as_i64()?;
        let method = request.get("method")?.as_str()?;
        let params = request.get("params").cloned().unwrap_or(Value::Null);
        Some(mock_response(id, f(method, &params)))
    }
}

#[derive(Debug, Clone)]
enum ServerCommand {
    Push(String),
    CloseAll,
}

/// Mock WebSocket server for client testing
///
/// Every accepted connection forwards received text frames to the test and
/// answers through the handler. Frames can also be pushed to all
/// connections, and all connections can be closed from the server side.
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    commands: broadcast::Sender<ServerCommand>,
    message_rx: mpsc::UnboundedReceiver<String>,
}

impl MockWsServer {
    /// Start a server that never answers
    pub async fn silent() -> Self {
        Self::with_handler(|_| None).await
    }

    /// Start a mock server with a custom message handler
    ///
    /// The handler receives each inbound text frame and returns the reply
    /// to send, if any.
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(String) -> Option<String> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (msg_tx, msg_rx) = mpsc::unbounded_channel::<String>();
        let (commands, _) = broadcast::channel::<ServerCommand>(64);
        let handler = Arc::new(handler);
        let server_commands = commands.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let (stream, _) = match accepted {
                            Ok(accepted) => accepted,
                            Err(_) => continue,
                        };
                        let msg_tx = msg_tx.clone();
                        let handler = Arc::clone(&handler);
                        let mut commands = server_commands.subscribe();

                        tokio::spawn(async move {
                            let ws_stream = match accept_async(stream).await {
                                Ok(ws_stream) => ws_stream,
                                Err(_) => return,
                            };
                            let (mut write, mut read) = ws_stream.split();

                            loop {
                                tokio::select! {
                                    inbound = read.next() => match inbound {
                                        Some(Ok(Message::Text(text))) => {
                                            let _ = msg_tx.send(text.clone());
                                            if let Some(reply) = handler(text) {
                                                if write.send(Message::Text(reply)).await.is_err() {
                                                    break;
                                                }
                                            }
                                        }
                                        Some(Ok(_)) => {}
                                        _ => break,
                                    },
                                    command = commands.recv() => match command {
                                        Ok(ServerCommand::Push(frame)) => {
                                            let _ = write.send(Message::Text(frame)).await;
                                        }
                                        Ok(ServerCommand::CloseAll) | Err(_) => {
                                            let _ = write.close().await;
                                            break;
                                        }
                                    },
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            commands,
            message_rx: msg_rx,
        }
    }

    /// Get the WebSocket URL for connecting to this server
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the next frame received by the server
    pub async fn wait_for_message(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.message_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Push a frame to every open connection
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.commands.send(ServerCommand::Push(frame.into()));
    }

    /// Close every open connection from the server side
    pub fn close_connections(&self) {
        let _ = self.commands.send(ServerCommand::CloseAll);
    }

    /// Shutdown the mock server
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        self.close_connections();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[derive(Default)]
struct ScriptState {
    sinks: Vec<SocketEventSink>,
    sent: Vec<String>,
    unavailable: bool,
    ready: bool,
    failing: bool,
}

/// In-memory socket supplier driven by the test
///
/// Connections start in the connecting state; the test decides when they
/// open, what they receive and when they close. Frames sent on any
/// connection are recorded in order.
#[derive(Clone, Default)]
pub struct ScriptedSupplier {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedSupplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections open immediately, without an open event
    pub fn ready() -> Self {
        let supplier = Self::default();
        supplier.state.lock().unwrap().ready = true;
        supplier
    }

    /// Refuse to create connections
    pub fn set_available(&self, available: bool) {
        self.state.lock().unwrap().unavailable = !available;
    }

    /// Make every send on every connection fail
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// Number of connections created so far
    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().sinks.len()
    }

    /// Frames sent so far, across all connections
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Frames sent so far, decoded
    pub fn sent_values(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap())
            .collect()
    }

    fn latest(&self) -> SocketEventSink {
        self.state
            .lock()
            .unwrap()
            .sinks
            .last()
            .cloned()
            .expect("no connection created yet")
    }

    /// Sink of connection number `index` (0-based)
    pub fn sink(&self, index: usize) -> SocketEventSink {
        self.state.lock().unwrap().sinks[index].clone()
    }

    /// Report the latest connection open
    pub fn open(&self) {
        self.latest().open();
    }

    /// Deliver an inbound frame on the latest connection
    pub fn deliver(&self, frame: impl Into<String>) {
        self.latest().message(frame);
    }

    /// Report the latest connection closed
    pub fn close(&self) {
        self.latest().close();
    }

    /// Report a failure on the latest connection
    pub fn fail(&self, reason: &str) {
        self.latest().error(reason);
    }
}

impl SocketSupplier for ScriptedSupplier {
    fn open(&self, events: SocketEventSink) -> Option<Box<dyn SocketLink>> {
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return None;
        }
        state.sinks.push(events);
        Some(Box::new(ScriptedLink {
            state: Arc::clone(&self.state),
            ready: state.ready,
        }))
    }
}

struct ScriptedLink {
    state: Arc<Mutex<ScriptState>>,
    ready: bool,
}

impl SocketLink for ScriptedLink {
    fn send(&mut self, frame: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            return Err(Error::WebSocket("scripted send failure".to_string()));
        }
        state.sent.push(frame);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }
}

/// One POST seen by `RecordingHttpTransport`
#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

type Responder = Arc<dyn Fn(&str) -> Result<HttpReply> + Send + Sync>;

/// HTTP transport with canned replies that records every request
///
/// Queued replies are used first; after that the responder, if any,
/// answers based on the request body.
#[derive(Clone, Default)]
pub struct RecordingHttpTransport {
    replies: Arc<Mutex<VecDeque<Result<HttpReply>>>>,
    responder: Option<Responder>,
    posts: Arc<Mutex<Vec<RecordedPost>>>,
}

impl RecordingHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `f(body)`
    pub fn responding<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<HttpReply> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Arc::new(f)),
            ..Self::default()
        }
    }

    /// Queue a reply
    pub fn reply(self, status: u16, body: impl Into<String>) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(HttpReply::new(status, body)));
        self
    }

    /// Queue an exchange failure
    pub fn fail_with(self, error: Error) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    /// Requests seen so far
    pub fn posts(&self) -> Vec<RecordedPost> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingHttpTransport {
    async fn post(
        &self,
        endpoint: &str,
        headers: &[(String, String)],
        body: String,
    ) -> Result<HttpReply> {
        self.posts.lock().unwrap().push(RecordedPost {
            endpoint: endpoint.to_string(),
            headers: headers.to_vec(),
            body: body.clone(),
        });

        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return reply;
        }
        match &self.responder {
            Some(responder) => responder(&body),
            None => Err(Error::Internal("no scripted HTTP reply".to_string())),
        }
    }
}

/// Responder answering every request in a body (single or batch) with
/// `{"echo": method}`
pub fn echo_responder(body: &str) -> Result<HttpReply> {
    let answer = |request: &Value| -> Option<Value> {
        let id = request.get("id")?.clone();
        let method = request.get("method")?.clone();
        Some(json!({"jsonrpc": "2.0", "id": id, "result": {"echo": method}}))
    };

    let parsed: Value = serde_json::from_str(body).map_err(Error::from)?;
    let reply = match parsed {
        Value::Array(requests) => Value::Array(requests.iter().filter_map(answer).collect()),
        request => answer(&request).unwrap_or(Value::Null),
    };
    Ok(HttpReply::new(200, reply.to_string()))
}
