//! Batch building and result reassembly
//!
//! A batch scope collects calls and notifications without sending anything.
//! `execute` chooses one transport for the whole batch and sends it:
//!
//! - **Socket**: one frame per entry (the socket has no batch envelope).
//!   Each call is registered like a direct call; its continuation feeds a
//!   shared collector that fires the aggregate once every call has answered.
//! - **HTTP**: one POST carrying the JSON array. The reply array is split by
//!   id and routed to the entries; ids the batch does not know are logged.
//!
//! On both paths the aggregate lists results in the order the calls were
//! added, whatever order the responses arrived in.
//!
//! # Examples
//!
//! ```rust,no_run
//! use twinrpc_client::ClientBuilder;
//! use serde_json::json;
//!
//! # async fn example() -> twinrpc_core::Result<()> {
//! let client = ClientBuilder::new()
//!     .http_endpoint("http://localhost:8080/rpc")
//!     .build()?;
//!
//! let mut batch = client.batch();
//! let first = batch.call("get", json!(["a"]))?;
//! let second = batch.call("get", json!(["b"]))?;
//! batch.notify("touch", json!({"key": "a"}))?;
//!
//! let all = batch.execute()?.await?;
//! assert_eq!(all.len(), 2);
//!
//! // Each entry also resolves on its own
//! let a = first.await?;
//! let b = second.await?;
//! # Ok(())
//! # }
//! ```

use crate::client::{ClientShared, TwinClient};
use crate::http::{self, HttpReply};
use crate::metrics::ClientMetrics;
use crate::request::{Continuation, PendingResponse};
use crate::transport::TransportKind;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use twinrpc_core::{
    codec, Error, Id, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, Params, Result,
};

type EntrySender = oneshot::Sender<Result<Value>>;
type AggregateSender = oneshot::Sender<Result<Vec<BatchResult>>>;

/// Outcome of one call inside a batch
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Id the call was issued with
    pub id: Id,
    /// The call's `result`, or the error that ended it
    pub outcome: Result<Value>,
}

impl BatchResult {
    /// Whether the call succeeded
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Deserialize the result into `R`
    pub fn get<R: DeserializeOwned>(&self) -> Result<R> {
        match &self.outcome {
            Ok(value) => serde_json::from_value(value.clone())
                .map_err(|e| Error::Serialization(e.to_string())),
            Err(e) => Err(e.clone()),
        }
    }
}

struct Entry {
    message: JsonRpcMessage,
    tx: Option<EntrySender>,
}

/// Scratch scope collecting the entries of one batch
///
/// Ids are drawn from the client's allocator as entries are added, so they
/// never collide with direct calls. Dropping the scope without executing it
/// resolves every entry's handle to `Error::NoResponse`.
pub struct BatchContext {
    client: TwinClient,
    entries: Vec<Entry>,
}

impl BatchContext {
    pub(crate) fn new(client: TwinClient) -> Self {
        Self {
            client,
            entries: Vec::new(),
        }
    }

    /// Add a call and return the handle on its individual result
    pub fn call<P>(&mut self, method: impl Into<String>, params: P) -> Result<PendingResponse>
    where
        P: Serialize,
    {
        let params = Params::from_serializable(params)?;
        let id = self.client.shared().ids.next();
        let (tx, pending) = PendingResponse::channel(id.clone(), None);

        self.entries.push(Entry {
            message: JsonRpcRequest::new(method, params, id).into(),
            tx: Some(tx),
        });
        Ok(pending)
    }

    /// Add a notification
    pub fn notify<P>(&mut self, method: impl Into<String>, params: P) -> Result<()>
    where
        P: Serialize,
    {
        let params = Params::from_serializable(params)?;
        self.entries.push(Entry {
            message: JsonRpcNotification::new(method, params).into(),
            tx: None,
        });
        Ok(())
    }

    /// Number of entries, calls and notifications alike
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Close the scope and send the batch
    ///
    /// An empty batch sends nothing and resolves to an empty list.
    ///
    /// # Errors
    ///
    /// Returns `Error::TransportUnavailable` if neither transport is usable;
    /// every entry's handle then resolves to `Error::NoResponse`.
    #[tracing::instrument(skip_all, fields(entries = self.entries.len()))]
    pub fn execute(self) -> Result<BatchHandle> {
        let (done_tx, done_rx) = oneshot::channel();

        if self.entries.is_empty() {
            let _ = done_tx.send(Ok(Vec::new()));
            return Ok(BatchHandle {
                transport: None,
                rx: done_rx,
            });
        }

        let shared = Arc::clone(self.client.shared());
        let kind = shared.select_transport()?;
        if let Some(ref m) = shared.metrics {
            m.record_batch(kind, self.entries.len() as u64);
        }

        match kind {
            TransportKind::Socket => execute_socket(&shared, self.entries, done_tx),
            TransportKind::Http => execute_http(&shared, self.entries, done_tx)?,
        }

        tracing::debug!(transport = %kind, "Batch dispatched");
        Ok(BatchHandle {
            transport: Some(kind),
            rx: done_rx,
        })
    }
}

impl fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchContext")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Handle on a batch's aggregate result
///
/// Resolves to one [`BatchResult`] per call, in the order the calls were
/// added. Notifications do not appear.
pub struct BatchHandle {
    transport: Option<TransportKind>,
    rx: oneshot::Receiver<Result<Vec<BatchResult>>>,
}

impl BatchHandle {
    /// Transport the batch went out on; `None` for an empty batch
    pub fn transport(&self) -> Option<TransportKind> {
        self.transport
    }
}

impl Future for BatchHandle {
    type Output = Result<Vec<BatchResult>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::NoResponse)))
    }
}

impl fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHandle")
            .field("transport", &self.transport)
            .finish()
    }
}

/// Gathers socket batch results until every call has answered
struct Collector {
    order: Vec<Id>,
    results: HashMap<Id, Result<Value>>,
    remaining: usize,
    done: Option<AggregateSender>,
}

impl Collector {
    fn new(order: Vec<Id>, done: AggregateSender) -> Self {
        Self {
            remaining: order.len(),
            order,
            results: HashMap::new(),
            done: Some(done),
        }
    }

    fn record(&mut self, id: Id, outcome: Result<Value>) {
        if self.results.insert(id, outcome).is_none() {
            self.remaining = self.remaining.saturating_sub(1);
        }
        if self.remaining == 0 {
            self.finish();
        }
    }

    fn finish(&mut self) {
        let done = match self.done.take() {
            Some(done) => done,
            None => return,
        };
        let results = self
            .order
            .iter()
            .filter_map(|id| {
                self.results.remove(id).map(|outcome| BatchResult {
                    id: id.clone(),
                    outcome,
                })
            })
            .collect();
        let _ = done.send(Ok(results));
    }
}

fn lock(collector: &Mutex<Collector>) -> MutexGuard<'_, Collector> {
    collector.lock().unwrap_or_else(PoisonError::into_inner)
}

fn collecting_continuation(
    id: Id,
    tx: Option<EntrySender>,
    collector: Arc<Mutex<Collector>>,
) -> Continuation {
    Box::new(move |outcome: Result<Value>| {
        if let Some(tx) = tx {
            let _ = tx.send(outcome.clone());
        }
        lock(&collector).record(id, outcome);
    })
}

fn execute_socket(shared: &Arc<ClientShared>, entries: Vec<Entry>, done: AggregateSender) {
    let order: Vec<Id> = entries
        .iter()
        .filter_map(|entry| entry.message.request_id().cloned())
        .collect();
    let collector = Arc::new(Mutex::new(Collector::new(order, done)));

    // Nothing to wait for when the batch holds only notifications.
    {
        let mut guard = lock(&collector);
        if guard.remaining == 0 {
            guard.finish();
        }
    }

    for entry in entries {
        let frame = codec::encode(&entry.message);

        let id = match entry.message.request_id().cloned() {
            Some(id) => id,
            None => {
                if let Err(e) = frame.and_then(|frame| shared.send_frame(frame)) {
                    tracing::warn!(error = %e, "Batch notification not sent");
                }
                continue;
            }
        };

        let continuation = collecting_continuation(id.clone(), entry.tx, Arc::clone(&collector));
        if let Err(e) = shared.registry.register(id.clone(), continuation) {
            tracing::error!(id = %id, error = %e, "Batch call not registered");
            lock(&collector).record(id, Err(e));
            continue;
        }

        if let Err(e) = frame.and_then(|frame| shared.send_frame(frame)) {
            tracing::warn!(id = %id, error = %e, "Batch call not sent");
            if let Some(call) = shared.registry.take(&id) {
                call.resolve(Err(e));
            }
        }
    }
}

fn execute_http(
    shared: &Arc<ClientShared>,
    entries: Vec<Entry>,
    done: AggregateSender,
) -> Result<()> {
    let endpoint = shared.http_endpoint()?.clone();
    let (messages, senders): (Vec<JsonRpcMessage>, Vec<Option<EntrySender>>) = entries
        .into_iter()
        .map(|entry| (entry.message, entry.tx))
        .unzip();
    let body = codec::encode_batch(&messages)?;

    let calls: Vec<(Id, Option<EntrySender>)> = messages
        .iter()
        .zip(senders)
        .filter_map(|(message, tx)| message.request_id().cloned().map(|id| (id, tx)))
        .collect();

    let metrics = shared.metrics.clone();
    shared.spawn(async move {
        let reply = endpoint.post(body).await;
        let results = route_http_batch(reply, calls);
        if let (Err(e), Some(m)) = (&results, &metrics) {
            m.record_error(e.kind());
        }
        record_outcomes(&results, metrics.as_deref());
        let _ = done.send(results);
    })
}

fn record_outcomes(results: &Result<Vec<BatchResult>>, metrics: Option<&ClientMetrics>) {
    if let (Ok(results), Some(m)) = (results, metrics) {
        for result in results.iter().filter(|result| !result.is_success()) {
            if let Err(e) = &result.outcome {
                m.record_error(e.kind());
            }
        }
    }
}

/// Resolve every call of an HTTP batch and build the aggregate
fn route_http_batch(
    reply: Result<HttpReply>,
    calls: Vec<(Id, Option<EntrySender>)>,
) -> Result<Vec<BatchResult>> {
    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => return fail_all(calls, e),
    };
    if !reply.is_success() {
        return fail_all(calls, http::failure_from_reply(&reply));
    }
    if calls.is_empty() {
        return Ok(Vec::new());
    }

    let items = match codec::decode_batch_response(&reply.body) {
        Ok(items) => items,
        Err(e) => {
            tracing::error!(error = %e, "Undecodable HTTP batch reply");
            return fail_all(
                calls,
                Error::Serialization(format!("HTTP batch reply is not a JSON-RPC batch: {}", e)),
            );
        }
    };

    let known = |id: &Id| calls.iter().any(|(call_id, _)| call_id == id);

    // A lone error nobody can claim means the server rejected the whole
    // batch; it stands in for every call the reply leaves unanswered.
    let mut rejection = None;
    if let [single] = items.as_slice() {
        if let Some(response) = codec::decode_response(single.clone()) {
            if response.is_error() && !known(&response.id) {
                if let Err(e) = response.into_outcome() {
                    tracing::warn!(error = %e, "HTTP batch rejected by server");
                    rejection = Some(e);
                }
            }
        }
    }

    let mut outcomes: HashMap<Id, Result<Value>> = HashMap::new();
    for item in items {
        let response = match codec::decode_response(item) {
            Some(response) => response,
            None => {
                tracing::warn!("Dropping malformed HTTP batch reply item");
                continue;
            }
        };
        if !known(&response.id) {
            tracing::warn!(id = %response.id, error = ?response.error, "HTTP batch reply for unknown id");
            continue;
        }
        if outcomes.contains_key(&response.id) {
            tracing::warn!(id = %response.id, "Duplicate HTTP batch reply ignored");
            continue;
        }
        outcomes.insert(response.id.clone(), response.into_outcome());
    }

    let results = calls
        .into_iter()
        .map(|(id, tx)| {
            let outcome = outcomes.remove(&id).unwrap_or_else(|| match &rejection {
                Some(e) => Err(e.clone()),
                None => {
                    tracing::warn!(id = %id, "HTTP batch reply has no entry for call");
                    Err(Error::NoResponse)
                }
            });
            if let Some(tx) = tx {
                let _ = tx.send(outcome.clone());
            }
            BatchResult { id, outcome }
        })
        .collect();
    Ok(results)
}

fn fail_all(calls: Vec<(Id, Option<EntrySender>)>, error: Error) -> Result<Vec<BatchResult>> {
    for (_, tx) in calls {
        if let Some(tx) = tx {
            let _ = tx.send(Err(error.clone()));
        }
    }
    Err(error)
}
