//! Socket lifecycle hooks
//!
//! Applications can observe what happens on the socket without interfering
//! with call correlation:
//!
//! - **Unrecognized message**: any inbound frame the dispatcher did not
//!   consume (server push, malformed data, stale responses)
//! - **Open** / **Close**: connection lifecycle
//! - **Error**: socket failures
//!
//! Hooks are async functions. They run on the client's event loop one at a
//! time, after the client has updated its own state for the event, so a
//! hook never overlaps another hook or a response dispatch.
//!
//! # Examples
//!
//! ```rust,no_run
//! use twinrpc_client::ClientBuilder;
//!
//! # fn example() -> twinrpc_core::Result<()> {
//! let client = ClientBuilder::new()
//!     .socket_endpoint("ws://localhost:8080")
//!     .on_unrecognized_message(|frame| async move {
//!         println!("server push: {}", frame);
//!     })
//!     .on_socket_close(|| async {
//!         println!("socket closed");
//!     })
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by every hook
pub type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Hook receiving a frame or an error description
pub type TextHookFn = Arc<dyn Fn(String) -> HookFuture + Send + Sync>;

/// Hook receiving nothing
pub type EventHookFn = Arc<dyn Fn() -> HookFuture + Send + Sync>;

/// Registered socket hooks; every hook is optional
#[derive(Clone, Default)]
pub struct SocketHooks {
    on_message: Option<TextHookFn>,
    on_open: Option<EventHookFn>,
    on_close: Option<EventHookFn>,
    on_error: Option<TextHookFn>,
}

fn text_hook<F, Fut>(handler: F) -> TextHookFn
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |text| Box::pin(handler(text)))
}

fn event_hook<F, Fut>(handler: F) -> EventHookFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move || Box::pin(handler()))
}

impl SocketHooks {
    /// Create an empty hook set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback handler for unrecognized inbound frames
    pub fn set_on_message<F, Fut>(&mut self, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_message = Some(text_hook(handler));
    }

    /// Set the open hook
    pub fn set_on_open<F, Fut>(&mut self, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_open = Some(event_hook(handler));
    }

    /// Set the close hook
    pub fn set_on_close<F, Fut>(&mut self, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_close = Some(event_hook(handler));
    }

    /// Set the error hook
    pub fn set_on_error<F, Fut>(&mut self, handler: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_error = Some(text_hook(handler));
    }

    /// Whether a fallback message handler is registered
    pub fn has_message_handler(&self) -> bool {
        self.on_message.is_some()
    }

    pub(crate) async fn unrecognized(&self, frame: String) {
        match &self.on_message {
            Some(handler) => handler(frame).await,
            None => tracing::debug!(len = frame.len(), "Dropping unrecognized frame, no handler"),
        }
    }

    pub(crate) async fn opened(&self) {
        if let Some(handler) = &self.on_open {
            handler().await;
        }
    }

    pub(crate) async fn closed(&self) {
        if let Some(handler) = &self.on_close {
            handler().await;
        }
    }

    pub(crate) async fn failed(&self, reason: String) {
        if let Some(handler) = &self.on_error {
            handler(reason).await;
        }
    }
}

impl std::fmt::Debug for SocketHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketHooks")
            .field("on_message", &self.on_message.is_some())
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
