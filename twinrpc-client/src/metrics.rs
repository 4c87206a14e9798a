//! Client metrics definitions
//!
//! OpenTelemetry instruments for monitoring a twinrpc client. They are
//! recorded through the global meter provider, so nothing is exported
//! unless the application installed one (for example through
//! `twinrpc_core::init_observability`).
//!
//! # Metrics Collected
//!
//! - **connection.state**: socket state (gauge, see `ConnectionState::as_gauge`)
//! - **calls.total**: completed calls by transport and status (counter)
//! - **call.duration**: call latency by transport and status (histogram)
//! - **notifications.total**: notifications sent by transport (counter)
//! - **errors.total**: errors by kind (counter)
//! - **batch.size**: entries per executed batch (histogram)
//! - **frames.queued**: frames queued while the socket was connecting (counter)
//! - **frames.unrouted**: inbound frames handed to the fallback handler (counter)
//!
//! # Examples
//!
//! ```rust
//! use twinrpc_client::{ClientMetrics, TransportKind};
//!
//! let metrics = ClientMetrics::new("inventory-client");
//! metrics.record_call(TransportKind::Http, "success", 0.012);
//! ```

use crate::connection::ConnectionState;
use crate::transport::TransportKind;
use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    InstrumentationScope, KeyValue,
};

/// Client metrics for monitoring
pub struct ClientMetrics {
    /// Socket connection state
    pub connection_state: Gauge<i64>,
    /// Completed calls
    pub calls_total: Counter<u64>,
    /// Call duration in seconds
    pub call_duration: Histogram<f64>,
    /// Notifications sent
    pub notifications_total: Counter<u64>,
    /// Errors by kind
    pub errors_total: Counter<u64>,
    /// Entries per batch
    pub batch_size: Histogram<u64>,
    /// Frames queued while connecting
    pub frames_queued: Counter<u64>,
    /// Inbound frames not matched to a pending call
    pub frames_unrouted: Counter<u64>,
}

impl ClientMetrics {
    /// Create metrics on a meter named after the service
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into())
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        let meter = global::meter_with_scope(scope);
        Self::new_with_meter(&meter)
    }

    /// Create metrics on a caller-supplied meter
    pub fn new_with_meter(meter: &Meter) -> Self {
        Self {
            connection_state: meter
                .i64_gauge("twinrpc.client.connection.state")
                .with_description("Socket state (0=absent, 1=connecting, 2=open, 3=closed)")
                .build(),
            calls_total: meter
                .u64_counter("twinrpc.client.calls.total")
                .with_description("Total number of completed calls")
                .build(),
            call_duration: meter
                .f64_histogram("twinrpc.client.call.duration")
                .with_description("Call duration in seconds")
                .with_unit("s")
                .build(),
            notifications_total: meter
                .u64_counter("twinrpc.client.notifications.total")
                .with_description("Total number of notifications sent")
                .build(),
            errors_total: meter
                .u64_counter("twinrpc.client.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
            batch_size: meter
                .u64_histogram("twinrpc.client.batch.size")
                .with_description("Number of entries in executed batches")
                .build(),
            frames_queued: meter
                .u64_counter("twinrpc.client.frames.queued")
                .with_description("Frames queued until the socket opened")
                .build(),
            frames_unrouted: meter
                .u64_counter("twinrpc.client.frames.unrouted")
                .with_description("Inbound frames handed to the fallback handler")
                .build(),
        }
    }

    /// Update connection state
    pub fn update_connection_state(&self, state: ConnectionState) {
        self.connection_state.record(state.as_gauge(), &[]);
    }

    /// Record a completed call
    pub fn record_call(&self, transport: TransportKind, status: &'static str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("transport", transport.as_str()),
            KeyValue::new("status", status),
        ];
        self.calls_total.add(1, attributes);
        self.call_duration.record(duration_secs, attributes);
    }

    /// Record a sent notification
    pub fn record_notification(&self, transport: TransportKind) {
        self.notifications_total
            .add(1, &[KeyValue::new("transport", transport.as_str())]);
    }

    /// Record an error
    pub fn record_error(&self, error_type: &'static str) {
        self.errors_total
            .add(1, &[KeyValue::new("error_type", error_type)]);
    }

    /// Record an executed batch
    pub fn record_batch(&self, transport: TransportKind, size: u64) {
        self.batch_size
            .record(size, &[KeyValue::new("transport", transport.as_str())]);
    }

    /// Record a frame queued behind a connecting socket
    pub fn record_queued_frame(&self) {
        self.frames_queued.add(1, &[]);
    }

    /// Record an inbound frame nobody was waiting for
    pub fn record_unrouted_frame(&self) {
        self.frames_unrouted.add(1, &[]);
    }
}

impl std::fmt::Debug for ClientMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientMetrics").finish_non_exhaustive()
    }
}
