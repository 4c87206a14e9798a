//! Client builder for endpoints, hooks and observability
//!
//! The `ClientBuilder` provides a fluent API for configuring a client. It
//! allows you to:
//! - Configure a socket endpoint, an HTTP endpoint, or both
//! - Add extra headers sent with every HTTP exchange
//! - Register socket lifecycle hooks
//! - Replace the socket or HTTP machinery (mainly for tests)
//! - Configure observability (OpenTelemetry)
//!
//! Building never touches the network; the socket is opened on first use.
//!
//! # Examples
//!
//! ```rust,no_run
//! use twinrpc_client::ClientBuilder;
//!
//! # fn example() -> twinrpc_core::Result<()> {
//! // Socket first, HTTP when the socket cannot be obtained
//! let client = ClientBuilder::new()
//!     .socket_endpoint("ws://localhost:8080/rpc")
//!     .http_endpoint("http://localhost:8080/rpc")
//!     .header("Authorization", "Bearer secret")
//!     .build()?;
//!
//! // With observability
//! let client2 = ClientBuilder::new()
//!     .http_endpoint("http://localhost:8080/rpc")
//!     .with_default_observability()
//!     .service_name("my-client")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::client::{ClientOptions, TwinClient};
use crate::hooks::SocketHooks;
use crate::http::{HttpEndpoint, HttpTransport, ReqwestTransport};
use crate::socket::{SocketSupplier, WebSocketSupplier};
use std::future::Future;
use std::sync::Arc;
use twinrpc_core::{Error, ObservabilityConfig, Result};

/// Builder for configuring and creating a `TwinClient`
pub struct ClientBuilder {
    http_endpoint: Option<String>,
    socket_endpoint: Option<String>,
    headers: Vec<(String, String)>,
    hooks: SocketHooks,
    supplier: Option<Arc<dyn SocketSupplier>>,
    http_transport: Option<Arc<dyn HttpTransport>>,
    fail_pending_on_close: bool,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
}

impl ClientBuilder {
    /// Create a builder with no transports configured
    pub fn new() -> Self {
        Self {
            http_endpoint: None,
            socket_endpoint: None,
            headers: Vec::new(),
            hooks: SocketHooks::new(),
            supplier: None,
            http_transport: None,
            fail_pending_on_close: false,
            observability_config: None,
            service_name: None,
        }
    }

    /// Set the HTTP endpoint used when no socket is available
    pub fn http_endpoint(mut self, url: impl Into<String>) -> Self {
        self.http_endpoint = Some(url.into());
        self
    }

    /// Set the WebSocket URL the socket is opened against
    pub fn socket_endpoint(mut self, url: impl Into<String>) -> Self {
        self.socket_endpoint = Some(url.into());
        self
    }

    /// Add a header sent with every HTTP exchange
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add several HTTP headers
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Handle inbound socket frames that answer no pending call
    pub fn on_unrecognized_message<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.set_on_message(handler);
        self
    }

    /// Run `handler` whenever a socket opens
    pub fn on_socket_open<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.set_on_open(handler);
        self
    }

    /// Run `handler` whenever a socket closes
    pub fn on_socket_close<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.set_on_close(handler);
        self
    }

    /// Run `handler` with a description of every socket error
    pub fn on_socket_error<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.set_on_error(handler);
        self
    }

    /// Obtain sockets from `supplier` instead of `socket_endpoint`
    pub fn connection_supplier(mut self, supplier: impl SocketSupplier + 'static) -> Self {
        self.supplier = Some(Arc::new(supplier));
        self
    }

    /// Perform HTTP exchanges through `transport` instead of reqwest
    pub fn http_transport(mut self, transport: impl HttpTransport + 'static) -> Self {
        self.http_transport = Some(Arc::new(transport));
        self
    }

    /// Fail every pending call with `ConnectionClosed` when the socket closes
    ///
    /// Off by default: calls whose response never arrives stay pending.
    pub fn fail_pending_on_close(mut self, enable: bool) -> Self {
        self.fail_pending_on_close = enable;
        self
    }

    /// Enable OpenTelemetry observability with custom configuration
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    /// Enable OpenTelemetry observability with default configuration
    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Set service name for observability (used if observability is enabled)
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// - `Error::Internal` if observability cannot be initialized or the
    ///   default HTTP client cannot be created
    pub fn build(self) -> Result<TwinClient> {
        let metrics = if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }

            twinrpc_core::init_observability(config.clone()).map_err(|e| {
                Error::Internal(format!("Failed to initialize observability: {}", e))
            })?;

            Some(Arc::new(crate::ClientMetrics::new(&config.service_name)))
        } else {
            None
        };

        let supplier = match (self.supplier, self.socket_endpoint) {
            (Some(supplier), _) => Some(supplier),
            (None, Some(url)) => {
                Some(Arc::new(WebSocketSupplier::new(url)) as Arc<dyn SocketSupplier>)
            }
            (None, None) => None,
        };

        let http = match self.http_endpoint {
            Some(url) => {
                let transport = match self.http_transport {
                    Some(transport) => transport,
                    None => Arc::new(ReqwestTransport::new()?) as Arc<dyn HttpTransport>,
                };
                Some(HttpEndpoint {
                    url,
                    headers: self.headers,
                    transport,
                })
            }
            None => {
                if self.http_transport.is_some() || !self.headers.is_empty() {
                    tracing::warn!("HTTP settings given without an HTTP endpoint, ignoring");
                }
                None
            }
        };

        tracing::info!(
            socket = supplier.is_some(),
            http = http.as_ref().map(|h| h.url.as_str()),
            "Client configured"
        );

        Ok(TwinClient::from_options(ClientOptions {
            supplier,
            http,
            hooks: self.hooks,
            fail_pending_on_close: self.fail_pending_on_close,
            metrics,
        }))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::http::HttpReply;
    use crate::socket::{SocketEventSink, SocketLink};
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl HttpTransport for NullTransport {
        async fn post(
            &self,
            _endpoint: &str,
            _headers: &[(String, String)],
            _body: String,
        ) -> Result<HttpReply> {
            Ok(HttpReply::new(200, "{}"))
        }
    }

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new();
        assert!(builder.http_endpoint.is_none());
        assert!(builder.socket_endpoint.is_none());
        assert!(builder.headers.is_empty());
        assert!(!builder.fail_pending_on_close);
        assert!(builder.observability_config.is_none());
        assert!(builder.service_name.is_none());
    }

    #[test]
    fn test_builder_headers() {
        let builder = ClientBuilder::new()
            .header("X-One", "1")
            .headers(vec![("X-Two", "2"), ("X-Three", "3")]);
        assert_eq!(builder.headers.len(), 3);
        assert_eq!(builder.headers[0], ("X-One".to_string(), "1".to_string()));
    }

    #[test]
    fn test_builder_observability_config() {
        let config = ObservabilityConfig::new("test-service")
            .with_endpoint("http://localhost:4317")
            .with_log_level("debug");

        let builder = ClientBuilder::new().with_observability(config);
        let obs_config = builder.observability_config.unwrap();
        assert_eq!(obs_config.service_name, "test-service");
        assert_eq!(obs_config.log_level, "debug");
    }

    #[test]
    fn test_builder_default_observability() {
        let builder = ClientBuilder::new()
            .with_default_observability()
            .service_name("my-service");
        assert!(builder.observability_config.is_some());
        assert_eq!(builder.service_name, Some("my-service".to_string()));
    }

    #[test]
    fn test_build_http_only() {
        let client = ClientBuilder::new()
            .http_endpoint("http://localhost:9/rpc")
            .http_transport(NullTransport)
            .build()
            .unwrap();
        assert!(client.has_http());
        assert!(!client.has_socket());
        assert_eq!(client.connection_state(), ConnectionState::Absent);
    }

    #[test]
    fn test_build_with_supplier() {
        let client = ClientBuilder::new()
            .connection_supplier(|_events: SocketEventSink| -> Option<Box<dyn SocketLink>> {
                None
            })
            .fail_pending_on_close(true)
            .build()
            .unwrap();
        assert!(client.has_socket());
        assert!(!client.has_http());
    }

    #[test]
    fn test_build_nothing_configured() {
        let client = ClientBuilder::default().build().unwrap();
        assert!(!client.has_socket());
        assert!(!client.has_http());
    }
}
