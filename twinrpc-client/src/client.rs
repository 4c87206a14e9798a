//! JSON-RPC client over a socket or HTTP
//!
//! This module provides the main `TwinClient` type. Every call, notification
//! and batch picks its transport at the moment it is issued: the socket when
//! one can be obtained, HTTP otherwise.
//!
//! # Client Lifecycle
//!
//! 1. **Build**: configure endpoints and hooks with `ClientBuilder`
//! 2. **Use**: `call`, `request`, `notify` and `batch`; the socket is created
//!    lazily on first use and recreated after it closes
//! 3. **Drop**: dropping the last clone releases the socket and stops the
//!    event loop
//!
//! # Non-blocking Calls
//!
//! `call`, `notify` and `batch().execute()` never wait on the network. They
//! return as soon as the message is handed to the socket (or queued behind a
//! connecting socket) or an HTTP exchange has been spawned. Results arrive
//! through the returned [`PendingResponse`] or [`BatchHandle`].
//!
//! # Event Loop
//!
//! Socket events from every connection instance funnel into one channel,
//! drained by a single task per client. Response dispatch and hooks
//! therefore never run concurrently with each other.
//!
//! # Cloning
//!
//! `TwinClient` is cheaply cloneable. All clones share the same id
//! sequence, pending calls and socket.
//!
//! [`BatchHandle`]: crate::BatchHandle

use crate::batch::BatchContext;
use crate::connection::{ConnectionState, SendDisposition, SocketConnectionManager};
use crate::dispatcher::{Dispatch, ResponseDispatcher};
use crate::hooks::SocketHooks;
use crate::http::{self, HttpEndpoint};
use crate::metrics::ClientMetrics;
use crate::request::{Continuation, IdAllocator, PendingCallRegistry, PendingResponse};
use crate::socket::{SocketEvent, SocketSupplier, TaggedEvent};
use crate::transport::{select_transport, TransportKind};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use twinrpc_core::{
    codec, Error, JsonRpcNotification, JsonRpcRequest, Params, Result,
};

/// Everything `ClientBuilder` resolved, ready to assemble a client
pub(crate) struct ClientOptions {
    pub(crate) supplier: Option<Arc<dyn SocketSupplier>>,
    pub(crate) http: Option<HttpEndpoint>,
    pub(crate) hooks: SocketHooks,
    pub(crate) fail_pending_on_close: bool,
    pub(crate) metrics: Option<Arc<ClientMetrics>>,
}

/// State shared by all clones of one client
pub(crate) struct ClientShared {
    pub(crate) ids: IdAllocator,
    pub(crate) registry: PendingCallRegistry,
    pub(crate) connection: SocketConnectionManager,
    pub(crate) http: Option<HttpEndpoint>,
    pub(crate) metrics: Option<Arc<ClientMetrics>>,
    dispatcher: ResponseDispatcher,
    hooks: SocketHooks,
    fail_pending_on_close: bool,
    events: Mutex<Option<mpsc::UnboundedReceiver<TaggedEvent>>>,
}

/// JSON-RPC 2.0 client over a socket or HTTP
///
/// # Examples
///
/// ```rust,no_run
/// use twinrpc_client::ClientBuilder;
/// use serde_json::json;
///
/// # async fn example() -> twinrpc_core::Result<()> {
/// let client = ClientBuilder::new()
///     .socket_endpoint("ws://localhost:8080/rpc")
///     .http_endpoint("http://localhost:8080/rpc")
///     .build()?;
///
/// // Fire the call, await the result later
/// let pending = client.call("add", json!([2, 3]))?;
/// assert_eq!(pending.await?, json!(5));
///
/// // Or in one step, with a typed result
/// let sum: i64 = client.request("add", json!({"a": 2, "b": 3})).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TwinClient {
    shared: Arc<ClientShared>,
}

impl TwinClient {
    pub(crate) fn from_options(options: ClientOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registry = PendingCallRegistry::new();

        let shared = ClientShared {
            ids: IdAllocator::new(),
            dispatcher: ResponseDispatcher::new(registry.clone()),
            registry,
            connection: SocketConnectionManager::new(options.supplier, events_tx),
            http: options.http,
            metrics: options.metrics,
            hooks: options.hooks,
            fail_pending_on_close: options.fail_pending_on_close,
            events: Mutex::new(Some(events_rx)),
        };

        Self {
            shared: Arc::new(shared),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<ClientShared> {
        &self.shared
    }

    /// Issue a call and return a handle on its result
    ///
    /// The transport is chosen now. Over the socket the call is registered
    /// before its frame is sent (or queued); over HTTP an exchange is
    /// spawned on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// - `Error::TransportUnavailable` if neither transport is usable
    /// - `Error::InvalidParams` if `params` is not an array or object
    /// - the socket's error if the frame could not be handed over
    #[tracing::instrument(skip_all, fields(method = %method.as_ref()))]
    pub fn call<P>(&self, method: impl Into<String> + AsRef<str>, params: P) -> Result<PendingResponse>
    where
        P: Serialize,
    {
        let shared = &self.shared;
        let kind = shared.select_transport()?;
        let params = Params::from_serializable(params)?;

        let id = shared.ids.next();
        let request = JsonRpcRequest::new(method, params, id.clone());
        let frame = codec::encode_request(&request)?;

        let (tx, pending) = PendingResponse::channel(id.clone(), Some(kind));
        let continuation = shared.completion(request.method, kind, tx);

        match kind {
            TransportKind::Socket => {
                shared.registry.register(id.clone(), continuation)?;
                if let Err(e) = shared.send_frame(frame) {
                    // The frame never left; nothing will answer this id.
                    shared.registry.take(&id);
                    return Err(e);
                }
            }
            TransportKind::Http => {
                let endpoint = shared.http_endpoint()?.clone();
                let call_id = id.clone();
                shared.spawn(async move {
                    let outcome = match endpoint.post(frame).await {
                        Ok(reply) => http::call_outcome(&reply, &call_id),
                        Err(e) => Err(e),
                    };
                    continuation(outcome);
                })?;
            }
        }

        tracing::debug!(id = %id, transport = %kind, "Call dispatched");
        Ok(pending)
    }

    /// Issue a call and wait for its result, deserialized into `R`
    #[tracing::instrument(skip_all, fields(method = %method.as_ref()))]
    pub async fn request<P, R>(&self, method: impl Into<String> + AsRef<str>, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let value = self.call(method, params)?.await?;
        serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Send a notification; no response is expected or awaited
    ///
    /// Returns the transport it went out on. Notifications never enter the
    /// pending-call registry. Over HTTP, a failed exchange is only logged.
    #[tracing::instrument(skip_all, fields(method = %method.as_ref()))]
    pub fn notify<P>(&self, method: impl Into<String> + AsRef<str>, params: P) -> Result<TransportKind>
    where
        P: Serialize,
    {
        let shared = &self.shared;
        let kind = shared.select_transport()?;
        let notification = JsonRpcNotification::new(method, Params::from_serializable(params)?);
        let frame = codec::encode_notification(&notification)?;

        match kind {
            TransportKind::Socket => {
                shared.send_frame(frame)?;
            }
            TransportKind::Http => {
                let endpoint = shared.http_endpoint()?.clone();
                let method = notification.method;
                shared.spawn(async move {
                    match endpoint.post(frame).await {
                        Ok(reply) if reply.is_success() => {}
                        Ok(reply) => {
                            let e = http::failure_from_reply(&reply);
                            tracing::warn!(method = %method, error = %e, "Notification rejected");
                        }
                        Err(e) => {
                            tracing::warn!(method = %method, error = %e, "Notification not delivered");
                        }
                    }
                })?;
            }
        }

        if let Some(ref m) = shared.metrics {
            m.record_notification(kind);
        }
        tracing::debug!(transport = %kind, "Notification sent");
        Ok(kind)
    }

    /// Open a batch scope
    ///
    /// Nothing is sent until [`BatchContext::execute`] is called.
    pub fn batch(&self) -> BatchContext {
        BatchContext::new(self.clone())
    }

    /// Number of socket calls still waiting for a response
    pub fn pending_calls(&self) -> usize {
        self.shared.registry.pending_count()
    }

    /// Current state of the socket connection
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.connection.state()
    }

    /// Whether a socket source is configured
    pub fn has_socket(&self) -> bool {
        self.shared.connection.is_configured()
    }

    /// Whether an HTTP endpoint is configured
    pub fn has_http(&self) -> bool {
        self.shared.http.is_some()
    }
}

impl std::fmt::Debug for TwinClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwinClient")
            .field("connection", &self.shared.connection)
            .field("http", &self.shared.http.as_ref().map(|h| h.url.as_str()))
            .field("pending", &self.shared.registry.pending_count())
            .finish()
    }
}

impl ClientShared {
    /// Choose the transport for one unit of work, creating the socket if needed
    pub(crate) fn select_transport(self: &Arc<Self>) -> Result<TransportKind> {
        let socket_resolvable = if self.connection.is_configured() {
            self.ensure_event_loop();
            let resolvable = self.connection.acquire();
            self.record_connection_state();
            resolvable
        } else {
            false
        };

        select_transport(socket_resolvable, self.http.is_some()).map_err(|e| {
            tracing::error!("No transport available");
            self.record_error(&e);
            e
        })
    }

    pub(crate) fn http_endpoint(&self) -> Result<&HttpEndpoint> {
        self.http
            .as_ref()
            .ok_or_else(|| Error::Internal("HTTP selected without an endpoint".to_string()))
    }

    /// Hand one frame to the socket
    pub(crate) fn send_frame(&self, frame: String) -> Result<SendDisposition> {
        let disposition = self.connection.send(frame).map_err(|e| {
            self.record_error(&e);
            e
        })?;
        if disposition == SendDisposition::Queued {
            if let Some(ref m) = self.metrics {
                m.record_queued_frame();
            }
        }
        self.record_connection_state();
        Ok(disposition)
    }

    /// Run `future` on the current tokio runtime
    pub(crate) fn spawn<F>(&self, future: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::Internal(format!("HTTP transport needs a tokio runtime: {}", e))
        })?;
        handle.spawn(future);
        Ok(())
    }

    /// Continuation for a direct call: records metrics, then resolves the handle
    fn completion(
        &self,
        method: String,
        kind: TransportKind,
        tx: oneshot::Sender<Result<Value>>,
    ) -> Continuation {
        let metrics = self.metrics.clone();
        let start = Instant::now();

        Box::new(move |outcome: Result<Value>| {
            let duration = start.elapsed().as_secs_f64();
            match &outcome {
                Ok(_) => {
                    tracing::debug!(method = %method, transport = %kind, duration_secs = duration, "Call completed");
                }
                Err(e) => {
                    tracing::debug!(method = %method, transport = %kind, error = %e, "Call failed");
                }
            }
            if let Some(ref m) = metrics {
                let status = if outcome.is_ok() { "success" } else { "error" };
                m.record_call(kind, status, duration);
                if let Err(e) = &outcome {
                    m.record_error(e.kind());
                }
            }
            let _ = tx.send(outcome);
        })
    }

    pub(crate) fn record_error(&self, error: &Error) {
        if let Some(ref m) = self.metrics {
            m.record_error(error.kind());
        }
    }

    fn record_connection_state(&self) {
        if let Some(ref m) = self.metrics {
            m.update_connection_state(self.connection.state());
        }
    }

    fn ensure_event_loop(self: &Arc<Self>) {
        let mut slot = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::debug!("No tokio runtime yet, socket event loop deferred");
                return;
            }
        };

        if let Some(events) = slot.take() {
            handle.spawn(run_event_loop(Arc::downgrade(self), events));
            tracing::debug!("Socket event loop started");
        }
    }

    async fn handle_event(&self, generation: u64, event: SocketEvent) {
        match event {
            SocketEvent::Open => {
                if self.connection.handle_open(generation) {
                    self.record_connection_state();
                }
                self.hooks.opened().await;
            }
            SocketEvent::Message(frame) => match self.dispatcher.dispatch(frame) {
                Dispatch::Resolved(_) => {}
                Dispatch::Fallback(frame) => {
                    if let Some(ref m) = self.metrics {
                        m.record_unrouted_frame();
                    }
                    self.hooks.unrecognized(frame).await;
                }
            },
            SocketEvent::Close => {
                self.mark_closed(generation);
                self.hooks.closed().await;
            }
            SocketEvent::Error(reason) => {
                let error = Error::WebSocket(reason.clone());
                tracing::warn!(generation, error = %error, "Socket error");
                self.record_error(&error);
                self.mark_closed(generation);
                self.hooks.failed(reason).await;
            }
        }
    }

    fn mark_closed(&self, generation: u64) {
        // Calls failed here must never reach the wire afterwards.
        let closed = if self.fail_pending_on_close {
            self.connection.handle_closed_discarding(generation).is_some()
        } else {
            self.connection.handle_closed(generation)
        };
        if !closed {
            return;
        }
        self.record_connection_state();

        if self.fail_pending_on_close {
            let drained = self.registry.drain_all();
            if !drained.is_empty() {
                tracing::warn!(count = drained.len(), "Failing pending calls on closed socket");
            }
            for call in drained {
                call.resolve(Err(Error::ConnectionClosed));
            }
        }
    }
}

/// Drain socket events for one client until it is dropped
async fn run_event_loop(
    shared: Weak<ClientShared>,
    mut events: mpsc::UnboundedReceiver<TaggedEvent>,
) {
    while let Some((generation, event)) = events.recv().await {
        let shared = match shared.upgrade() {
            Some(shared) => shared,
            None => break,
        };
        shared.handle_event(generation, event).await;
    }
    tracing::debug!("Socket event loop stopped");
}
