//! Request id allocation and pending-call tracking
//!
//! Every call that travels over the socket is correlated with its response
//! through the request id:
//!
//! 1. **Allocate**: take the next id from the client's `IdAllocator`
//! 2. **Register**: store the call's continuation under that id
//! 3. **Send**: hand the encoded frame to the connection manager
//! 4. **Receive**: the dispatcher decodes an inbound response
//! 5. **Resolve**: `take` removes the entry and the continuation runs once
//!
//! Registration always happens before the frame is sent, so a response can
//! never arrive for an id the registry does not know yet.
//!
//! Calls that travel over HTTP never enter the registry; their response
//! comes back on the same exchange.
//!
//! There are no timeouts. A call whose response never arrives stays
//! registered until the registry is drained.

use crate::transport::TransportKind;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use twinrpc_core::{Error, Id, Result};

/// Single-shot completion for a call
///
/// Receives either the call's `result` or the error that ended it.
pub type Continuation = Box<dyn FnOnce(Result<Value>) + Send + 'static>;

/// Strictly increasing id source shared by every call and batch of a client
///
/// Clones share the same counter.
///
/// ```rust
/// use twinrpc_client::IdAllocator;
/// use twinrpc_core::Id;
///
/// let ids = IdAllocator::new();
/// assert_eq!(ids.next(), Id::Number(1));
/// assert_eq!(ids.clone().next(), Id::Number(2));
/// ```
#[derive(Clone, Debug)]
pub struct IdAllocator {
    next: Arc<AtomicU64>,
}

impl IdAllocator {
    /// Create an allocator whose first id is 1
    pub fn new() -> Self {
        Self {
            next: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Return the next id
    pub fn next(&self) -> Id {
        Id::from(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next call to `next` will return
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// A call waiting for its response
pub struct PendingCall {
    id: Id,
    continuation: Continuation,
}

impl PendingCall {
    /// Id the call was issued with
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Run the continuation, consuming the entry
    pub fn resolve(self, outcome: Result<Value>) {
        (self.continuation)(outcome);
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall").field("id", &self.id).finish()
    }
}

/// Caller's handle on one call
///
/// Resolves to the call's `result` or its error. If the call can no longer
/// be answered (for example an HTTP batch reply that omits it) the handle
/// resolves to `Error::NoResponse`.
///
/// Dropping the handle does not cancel the call; a socket call stays
/// registered until its response arrives.
pub struct PendingResponse {
    id: Id,
    transport: Option<TransportKind>,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingResponse {
    pub(crate) fn channel(
        id: Id,
        transport: Option<TransportKind>,
    ) -> (oneshot::Sender<Result<Value>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { id, transport, rx })
    }

    /// Request id of the call
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Transport carrying the call
    ///
    /// `None` for batch entries, whose transport is only chosen when the
    /// batch executes.
    pub fn transport(&self) -> Option<TransportKind> {
        self.transport
    }
}

impl Future for PendingResponse {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::NoResponse)))
    }
}

impl fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Registry of in-flight socket calls keyed by request id
///
/// Clones share the same map. All operations take a short synchronous lock
/// and never hold it while a continuation runs.
#[derive(Clone, Default)]
pub struct PendingCallRegistry {
    pending: Arc<Mutex<HashMap<Id, PendingCall>>>,
}

impl PendingCallRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Id, PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a continuation for `id`
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateId` if `id` is already pending. The existing
    /// entry is left untouched and the new continuation is dropped.
    pub fn register(&self, id: Id, continuation: Continuation) -> Result<()> {
        let mut pending = self.lock();
        if pending.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        pending.insert(id.clone(), PendingCall { id, continuation });
        Ok(())
    }

    /// Remove and return the entry for `id`
    ///
    /// Atomic with respect to other callers, so an id resolves at most once
    /// even if the same response is delivered twice.
    pub fn take(&self, id: &Id) -> Option<PendingCall> {
        self.lock().remove(id)
    }

    /// Remove and return every pending entry, in ascending id order
    pub fn drain_all(&self) -> Vec<PendingCall> {
        let mut drained: Vec<PendingCall> = self.lock().drain().map(|(_, call)| call).collect();
        drained.sort_by_key(|call| call.id.as_u64().unwrap_or(u64::MAX));
        drained
    }

    /// Whether `id` is currently pending
    pub fn contains(&self, id: &Id) -> bool {
        self.lock().contains_key(id)
    }

    /// Number of pending entries
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }
}

impl fmt::Debug for PendingCallRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCallRegistry")
            .field("pending", &self.pending_count())
            .finish()
    }
}
