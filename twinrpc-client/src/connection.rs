//! Socket connection lifecycle
//!
//! The client owns exactly one [`SocketConnectionManager`], which owns at
//! most one live connection at a time.
//!
//! # Connection States
//!
//! - **Absent**: no connection has been created yet
//! - **Connecting**: created, not yet usable
//! - **Open**: usable for immediate sends
//! - **Closed**: dead, replaced on next use
//!
//! # State Transitions
//!
//! ```text
//! Absent ──acquire──▶ Connecting ──open event──▶ Open
//!                         │                       │
//!                         └──close/error event────┴──▶ Closed ──acquire──▶ Connecting
//! ```
//!
//! # Outbound Queue
//!
//! Frames sent while the connection is `Connecting` are queued and flushed
//! in FIFO order when the open event arrives. The flush happens once per
//! connection instance. Frames still queued when a connection dies before
//! opening stay queued for its replacement, unless the close discards them
//! with [`SocketConnectionManager::handle_closed_discarding`].
//!
//! # Generations
//!
//! Every connection instance gets a fresh generation number. Lifecycle
//! events carry the generation of the connection that produced them and are
//! ignored for bookkeeping when that connection has since been replaced.

use crate::socket::{SocketEventSink, SocketLink, SocketSupplier, TaggedEvent};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use twinrpc_core::{Error, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection exists
    Absent,
    /// Created, waiting for the open event
    Connecting,
    /// Usable for immediate sends
    Open,
    /// Dead; the next use creates a new connection
    Closed,
}

impl ConnectionState {
    /// Numeric encoding used by the connection-state gauge
    pub fn as_gauge(self) -> i64 {
        match self {
            ConnectionState::Absent => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Open => 2,
            ConnectionState::Closed => 3,
        }
    }
}

/// What happened to a frame handed to [`SocketConnectionManager::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDisposition {
    /// Written to an open connection
    Sent,
    /// Queued until the connection opens
    Queued,
}

struct Slot {
    generation: u64,
    state: ConnectionState,
    link: Option<Box<dyn SocketLink>>,
    queue: VecDeque<String>,
}

/// Owner of the client's single socket connection
pub struct SocketConnectionManager {
    supplier: Option<Arc<dyn SocketSupplier>>,
    events: mpsc::UnboundedSender<TaggedEvent>,
    slot: Mutex<Slot>,
}

impl SocketConnectionManager {
    /// Create a manager that obtains connections from `supplier`
    ///
    /// Without a supplier the socket transport is never resolvable.
    pub(crate) fn new(
        supplier: Option<Arc<dyn SocketSupplier>>,
        events: mpsc::UnboundedSender<TaggedEvent>,
    ) -> Self {
        Self {
            supplier,
            events,
            slot: Mutex::new(Slot {
                generation: 0,
                state: ConnectionState::Absent,
                link: None,
                queue: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a connection supplier is configured at all
    pub fn is_configured(&self) -> bool {
        self.supplier.is_some()
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Generation of the current connection instance (0 before the first)
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Number of frames waiting for the connection to open
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Make sure a connection exists
    ///
    /// Reuses a `Connecting` or `Open` connection; otherwise asks the
    /// supplier for a new one. Returns whether a socket is resolvable.
    pub fn acquire(&self) -> bool {
        let mut slot = self.lock();
        self.acquire_locked(&mut slot)
    }

    fn acquire_locked(&self, slot: &mut Slot) -> bool {
        if matches!(
            slot.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            return true;
        }

        let supplier = match &self.supplier {
            Some(supplier) => supplier,
            None => return false,
        };

        // Bump even if the supplier declines, so a declined attempt's sink
        // can never be mistaken for a later connection.
        slot.generation += 1;
        let generation = slot.generation;
        let sink = SocketEventSink::new(generation, self.events.clone());

        let link = match supplier.open(sink) {
            Some(link) => link,
            None => {
                tracing::debug!(generation, "Connection supplier returned no socket");
                return false;
            }
        };

        let ready = link.is_ready();
        slot.link = Some(link);
        slot.state = ConnectionState::Connecting;
        tracing::info!(generation, ready, "Socket connection created");

        if ready {
            Self::open_locked(slot);
        }
        true
    }

    /// Send `frame`, creating or waiting for the connection as needed
    ///
    /// # Errors
    ///
    /// - `Error::TransportUnavailable` if no connection can be created
    /// - the link's error if an open connection rejects the frame; the
    ///   connection is then marked `Closed`
    pub fn send(&self, frame: String) -> Result<SendDisposition> {
        let mut slot = self.lock();

        if !self.acquire_locked(&mut slot) {
            return Err(Error::TransportUnavailable);
        }

        match slot.state {
            ConnectionState::Open => {
                let result = match slot.link.as_mut() {
                    Some(link) => link.send(frame),
                    None => Err(Error::ConnectionClosed),
                };
                match result {
                    Ok(()) => Ok(SendDisposition::Sent),
                    Err(e) => {
                        tracing::error!(generation = slot.generation, error = %e, "Socket send failed");
                        Self::close_locked(&mut slot);
                        Err(e)
                    }
                }
            }
            ConnectionState::Connecting => {
                slot.queue.push_back(frame);
                tracing::debug!(queued = slot.queue.len(), "Frame queued until socket opens");
                Ok(SendDisposition::Queued)
            }
            ConnectionState::Absent | ConnectionState::Closed => Err(Error::Internal(
                "Connection not usable after acquire".to_string(),
            )),
        }
    }

    /// Handle the open event of connection `generation`
    ///
    /// Returns `false` if the event belongs to a replaced connection or the
    /// connection was already open.
    pub fn handle_open(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation || slot.state != ConnectionState::Connecting {
            tracing::debug!(
                generation,
                current = slot.generation,
                "Ignoring open event for inactive connection"
            );
            return false;
        }
        Self::open_locked(&mut slot);
        true
    }

    /// Handle the close (or failure) of connection `generation`
    ///
    /// Returns `false` if the event belongs to a replaced connection or the
    /// connection was already closed.
    pub fn handle_closed(&self, generation: u64) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation || slot.state == ConnectionState::Closed {
            return false;
        }
        Self::close_locked(&mut slot);
        true
    }

    /// Like [`handle_closed`](Self::handle_closed), but also drops every
    /// queued frame so no replacement connection sends it
    ///
    /// Returns the number of discarded frames, or `None` if the event was
    /// ignored.
    pub fn handle_closed_discarding(&self, generation: u64) -> Option<usize> {
        let mut slot = self.lock();
        if slot.generation != generation || slot.state == ConnectionState::Closed {
            return None;
        }
        Self::close_locked(&mut slot);
        let discarded = slot.queue.len();
        slot.queue.clear();
        if discarded > 0 {
            tracing::warn!(generation, discarded, "Discarded frames queued for closed socket");
        }
        Some(discarded)
    }

    fn open_locked(slot: &mut Slot) {
        slot.state = ConnectionState::Open;
        let generation = slot.generation;

        let mut flushed = 0usize;
        let mut failure = None;
        if let Some(link) = slot.link.as_mut() {
            while let Some(frame) = slot.queue.pop_front() {
                if let Err(e) = link.send(frame.clone()) {
                    slot.queue.push_front(frame);
                    failure = Some(e);
                    break;
                }
                flushed += 1;
            }
        }

        if let Some(e) = failure {
            tracing::error!(generation, flushed, error = %e, "Flushing queued frames failed");
            Self::close_locked(slot);
            return;
        }

        tracing::info!(generation, flushed, "Socket connection open");
    }

    fn close_locked(slot: &mut Slot) {
        slot.state = ConnectionState::Closed;
        slot.link = None;
        tracing::info!(
            generation = slot.generation,
            queued = slot.queue.len(),
            "Socket connection closed"
        );
    }
}

impl fmt::Debug for SocketConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.lock();
        f.debug_struct("SocketConnectionManager")
            .field("configured", &self.supplier.is_some())
            .field("generation", &slot.generation)
            .field("state", &slot.state)
            .field("queued", &slot.queue.len())
            .finish()
    }
}
