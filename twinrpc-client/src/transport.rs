//! Per-call transport selection
//!
//! A resolvable socket always wins, even when an HTTP endpoint is configured
//! as well. HTTP is only used when no socket can be obtained. The decision is
//! made again for every call, notification and batch, so consecutive calls
//! on one client may travel over different transports.

use std::fmt;
use twinrpc_core::{Error, Result};

/// Transport chosen for one call, notification or batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// The client's persistent socket connection
    Socket,
    /// One HTTP POST exchange
    Http,
}

impl TransportKind {
    /// Label used in log fields and metric attributes
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Socket => "socket",
            TransportKind::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the transport for one outgoing unit of work
///
/// ```rust
/// use twinrpc_client::{select_transport, TransportKind};
///
/// assert_eq!(select_transport(true, true).unwrap(), TransportKind::Socket);
/// assert_eq!(select_transport(false, true).unwrap(), TransportKind::Http);
/// assert!(select_transport(false, false).is_err());
/// ```
///
/// # Errors
///
/// Returns `Error::TransportUnavailable` when neither transport is usable.
pub fn select_transport(socket_resolvable: bool, http_configured: bool) -> Result<TransportKind> {
    match (socket_resolvable, http_configured) {
        (true, _) => Ok(TransportKind::Socket),
        (false, true) => Ok(TransportKind::Http),
        (false, false) => Err(Error::TransportUnavailable),
    }
}
