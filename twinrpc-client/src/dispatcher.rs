//! Routing of inbound socket frames to pending calls
//!
//! Every text frame received on the socket goes through
//! [`ResponseDispatcher::dispatch`], which either resolves exactly one
//! pending call or hands the frame back for the fallback handler:
//!
//! 1. Not valid JSON → fallback
//! 2. Not an object tagged `"jsonrpc": "2.0"` carrying `result` or `error`
//!    → fallback
//! 3. `result` and the id is pending → success continuation
//! 4. `error` and the id is pending → error continuation
//! 5. Anything else (unknown, stale or duplicate id) → fallback
//!
//! Resolution is keyed on the id alone, so responses may arrive in any
//! order. Nothing here fails: a frame is always either consumed or returned.

use crate::request::PendingCallRegistry;
use twinrpc_core::{codec, Id};

/// Outcome of dispatching one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// The frame resolved the pending call with this id
    Resolved(Id),
    /// The frame was not a response to any pending call
    Fallback(String),
}

/// Matches inbound responses against the pending-call registry
#[derive(Debug, Clone)]
pub struct ResponseDispatcher {
    registry: PendingCallRegistry,
}

impl ResponseDispatcher {
    /// Dispatcher resolving calls from `registry`
    pub fn new(registry: PendingCallRegistry) -> Self {
        Self { registry }
    }

    /// Route one inbound frame
    pub fn dispatch(&self, frame: String) -> Dispatch {
        let value = match codec::decode_value(&frame) {
            Ok(value) => value,
            Err(_) => {
                tracing::debug!(len = frame.len(), "Inbound frame is not JSON");
                return Dispatch::Fallback(frame);
            }
        };

        let response = match codec::decode_response(value) {
            Some(response) => response,
            None => {
                tracing::debug!("Inbound frame is not a JSON-RPC response");
                return Dispatch::Fallback(frame);
            }
        };

        let id = response.id.clone();
        let pending = match self.registry.take(&id) {
            Some(pending) => pending,
            None => {
                tracing::debug!(id = %id, "Unroutable response");
                return Dispatch::Fallback(frame);
            }
        };

        tracing::debug!(id = %id, success = response.is_success(), "Response routed");
        pending.resolve(response.into_outcome());

        Dispatch::Resolved(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Continuation;
    use serde_json::{json, Value};
    use std::sync::mpsc;
    use twinrpc_core::{Error, Result};

    fn register(registry: &PendingCallRegistry, id: i64) -> mpsc::Receiver<Result<Value>> {
        let (tx, rx) = mpsc::channel();
        let continuation: Continuation = Box::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        registry.register(Id::Number(id), continuation).unwrap();
        rx
    }

    #[test]
    fn test_success_routed_by_id() {
        let registry = PendingCallRegistry::new();
        let rx = register(&registry, 1);
        let dispatcher = ResponseDispatcher::new(registry.clone());

        let outcome = dispatcher.dispatch(r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#.to_string());
        assert_eq!(outcome, Dispatch::Resolved(Id::Number(1)));
        assert_eq!(rx.recv().unwrap().unwrap(), json!("pong"));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_float_id_routed_to_integer_call() {
        let registry = PendingCallRegistry::new();
        let rx = register(&registry, 3);
        let dispatcher = ResponseDispatcher::new(registry);

        let outcome = dispatcher.dispatch(r#"{"jsonrpc":"2.0","id":3.0,"result":"ok"}"#.to_string());
        assert_eq!(outcome, Dispatch::Resolved(Id::Number(3)));
        assert_eq!(rx.recv().unwrap().unwrap(), json!("ok"));
    }

    #[test]
    fn test_null_result_is_success() {
        let registry = PendingCallRegistry::new();
        let rx = register(&registry, 2);
        let dispatcher = ResponseDispatcher::new(registry);

        dispatcher.dispatch(r#"{"jsonrpc":"2.0","id":2,"result":null}"#.to_string());
        assert_eq!(rx.recv().unwrap().unwrap(), Value::Null);
    }

    #[test]
    fn test_error_routed_verbatim() {
        let registry = PendingCallRegistry::new();
        let rx = register(&registry, 3);
        let dispatcher = ResponseDispatcher::new(registry);

        dispatcher.dispatch(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32000,"message":"busy","data":[1]}}"#
                .to_string(),
        );
        match rx.recv().unwrap() {
            Err(Error::JsonRpc(error)) => {
                assert_eq!(error.code, -32000);
                assert_eq!(error.message, "busy");
                assert_eq!(error.data, Some(json!([1])));
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_order_delivery() {
        let registry = PendingCallRegistry::new();
        let rx_a = register(&registry, 10);
        let rx_b = register(&registry, 11);
        let dispatcher = ResponseDispatcher::new(registry.clone());

        dispatcher.dispatch(r#"{"jsonrpc":"2.0","id":11,"result":"b"}"#.to_string());
        assert_eq!(rx_b.recv().unwrap().unwrap(), json!("b"));
        assert!(rx_a.try_recv().is_err());
        assert!(registry.contains(&Id::Number(10)));

        dispatcher.dispatch(r#"{"jsonrpc":"2.0","id":10,"result":"a"}"#.to_string());
        assert_eq!(rx_a.recv().unwrap().unwrap(), json!("a"));
    }

    #[test]
    fn test_fallback_cases() {
        let registry = PendingCallRegistry::new();
        let _rx = register(&registry, 1);
        let dispatcher = ResponseDispatcher::new(registry.clone());

        let frames = [
            "not json at all",
            "[1,2,3]",
            r#""just a string""#,
            r#"{"jsonrpc":"1.0","id":1,"result":true}"#,
            r#"{"jsonrpc":"2.0","method":"tick","params":[]}"#,
            r#"{"jsonrpc":"2.0","id":99,"result":true}"#,
            r#"{"jsonrpc":"2.0","id":"1","result":true}"#,
            r#"{"jsonrpc":"2.0","id":1}"#,
        ];
        for frame in frames {
            assert_eq!(
                dispatcher.dispatch(frame.to_string()),
                Dispatch::Fallback(frame.to_string()),
                "frame {} should fall back",
                frame
            );
        }
        assert_eq!(registry.pending_count(), 1);
    }

    #[test]
    fn test_duplicate_response_falls_back() {
        let registry = PendingCallRegistry::new();
        let rx = register(&registry, 5);
        let dispatcher = ResponseDispatcher::new(registry);
        let frame = r#"{"jsonrpc":"2.0","id":5,"result":1}"#.to_string();

        assert_eq!(dispatcher.dispatch(frame.clone()), Dispatch::Resolved(Id::Number(5)));
        assert_eq!(dispatcher.dispatch(frame.clone()), Dispatch::Fallback(frame));
        assert_eq!(rx.recv().unwrap().unwrap(), json!(1));
        assert!(rx.try_recv().is_err());
    }
}
