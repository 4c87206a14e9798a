//! Socket seam between the connection manager and a concrete socket
//!
//! The client never talks to a WebSocket directly. It asks a
//! [`SocketSupplier`] for a [`SocketLink`] and receives that link's lifecycle
//! through a [`SocketEventSink`]:
//!
//! ```text
//!   SocketConnectionManager ──open(sink)──▶ SocketSupplier
//!            │                                   │
//!            │ send(frame)                       │ creates
//!            ▼                                   ▼
//!        SocketLink ─────────────────────▶ socket task
//!                                                │
//!   event loop ◀──(generation, SocketEvent)── SocketEventSink
//! ```
//!
//! Each sink is stamped with the generation of the connection it belongs to,
//! so events from a replaced connection can be told apart from the current
//! one.
//!
//! [`WebSocketSupplier`] is the default implementation over
//! tokio-tungstenite. Tests and embedders can provide their own supplier to
//! drive the lifecycle by hand.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use twinrpc_core::{Error, Result};

/// Lifecycle event reported by a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The socket became usable for sending
    Open,
    /// A text frame arrived
    Message(String),
    /// The socket closed, locally or remotely
    Close,
    /// The socket failed
    Error(String),
}

/// Event paired with the generation of the connection that produced it
pub(crate) type TaggedEvent = (u64, SocketEvent);

/// Where a socket reports its lifecycle events
///
/// Cloneable; every clone reports under the same connection generation.
#[derive(Debug, Clone)]
pub struct SocketEventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl SocketEventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Connection generation this sink reports for
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event
    ///
    /// Returns `false` once the owning client has been dropped.
    pub fn emit(&self, event: SocketEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }

    /// Report that the socket is open
    pub fn open(&self) -> bool {
        self.emit(SocketEvent::Open)
    }

    /// Report an inbound text frame
    pub fn message(&self, frame: impl Into<String>) -> bool {
        self.emit(SocketEvent::Message(frame.into()))
    }

    /// Report that the socket closed
    pub fn close(&self) -> bool {
        self.emit(SocketEvent::Close)
    }

    /// Report a socket failure
    pub fn error(&self, reason: impl Into<String>) -> bool {
        self.emit(SocketEvent::Error(reason.into()))
    }

    /// Whether the owning client is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Sending half of one connection instance
///
/// Dropping the link releases the connection.
pub trait SocketLink: Send {
    /// Hand one text frame to the socket
    ///
    /// Only called after the link is open. Must not block.
    fn send(&mut self, frame: String) -> Result<()>;

    /// Whether the link is usable immediately after creation
    ///
    /// A link that reports `true` is treated as open without waiting for
    /// a `SocketEvent::Open`.
    fn is_ready(&self) -> bool {
        false
    }
}

/// Factory for connection instances
///
/// Called lazily the first time the socket transport is needed and again
/// whenever the previous connection has closed. Returning `None` means no
/// socket is available right now, in which case the client falls back to
/// HTTP if configured.
pub trait SocketSupplier: Send + Sync {
    /// Create a connection that reports its lifecycle through `events`
    fn open(&self, events: SocketEventSink) -> Option<Box<dyn SocketLink>>;
}

impl<F> SocketSupplier for F
where
    F: Fn(SocketEventSink) -> Option<Box<dyn SocketLink>> + Send + Sync,
{
    fn open(&self, events: SocketEventSink) -> Option<Box<dyn SocketLink>> {
        self(events)
    }
}

/// Default supplier: one tokio-tungstenite WebSocket per connection instance
///
/// The connection is established on a spawned task, so `open` needs a tokio
/// runtime. Outside a runtime it logs and yields no link.
#[derive(Debug, Clone)]
pub struct WebSocketSupplier {
    url: String,
}

impl WebSocketSupplier {
    /// Supplier connecting to `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SocketSupplier for WebSocketSupplier {
    fn open(&self, events: SocketEventSink) -> Option<Box<dyn SocketLink>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(url = %self.url, error = %e, "Cannot open WebSocket outside a tokio runtime");
                return None;
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        handle.spawn(run_websocket(self.url.clone(), events, outbound_rx));

        Some(Box::new(WebSocketLink {
            outbound: outbound_tx,
        }))
    }
}

struct WebSocketLink {
    outbound: mpsc::UnboundedSender<String>,
}

impl SocketLink for WebSocketLink {
    fn send(&mut self, frame: String) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| Error::ConnectionClosed)
    }
}

#[tracing::instrument(skip(events, outbound), fields(generation = events.generation()))]
async fn run_websocket(
    url: String,
    events: SocketEventSink,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    tracing::info!(url = %url, "Connecting WebSocket");
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            tracing::error!(url = %url, error = %e, "WebSocket connect failed");
            events.error(e.to_string());
            events.close();
            return;
        }
    };

    tracing::info!(url = %url, "WebSocket connected");
    events.open();

    let (mut sender, mut receiver) = ws_stream.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sender.send(Message::Text(text)).await {
                        tracing::error!(error = %e, "WebSocket send failed");
                        events.error(e.to_string());
                        events.close();
                        return;
                    }
                }
                None => {
                    // Link dropped: the manager replaced or released this connection.
                    tracing::debug!("WebSocket link released, closing");
                    let _ = sender.close().await;
                    return;
                }
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if !events.message(text) {
                        return;
                    }
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        if !events.message(text) {
                            return;
                        }
                    }
                    Err(_) => tracing::debug!("Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("WebSocket closed by server");
                    events.close();
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "WebSocket error");
                    events.error(e.to_string());
                    events.close();
                    return;
                }
            },
        }
    }
}
