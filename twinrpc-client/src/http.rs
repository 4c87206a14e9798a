//! HTTP transport
//!
//! A call over HTTP is one `POST` of the encoded request (or batch array) to
//! the configured endpoint with `Content-Type: application/json` plus any
//! configured extra headers. The response comes back on the same exchange,
//! so HTTP calls never touch the pending-call registry.
//!
//! The exchange itself goes through the [`HttpTransport`] trait so it can be
//! replaced in tests; [`ReqwestTransport`] is the default.
//!
//! # Outcome Mapping
//!
//! - Success status, body with an `error` member → `Error::JsonRpc`
//! - Success status, otherwise → the body's `result` (JSON `null` if absent)
//! - Success status, body not JSON → `Error::Serialization`
//! - Non-success status → `Error::HttpTransport` carrying the body's `error`
//!   object when there is one, the raw text otherwise
//! - No status at all (connect failure) → `Error::HttpTransport` with
//!   `status: None`

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use twinrpc_core::{codec, Error, HttpErrorPayload, Id, JsonRpcErrorData, Result};

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: String,
}

impl HttpReply {
    /// Create a reply
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One POST exchange
///
/// Implementations return `Ok` for every exchange that produced a status,
/// including non-success ones. `Err` is reserved for exchanges that never
/// got that far.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST `body` to `endpoint` with the given extra headers
    async fn post(&self, endpoint: &str, headers: &[(String, String)], body: String)
        -> Result<HttpReply>;
}

/// Default transport backed by a pooled `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a fresh connection pool
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the underlying client cannot be built
    /// (for example when no TLS backend is available).
    pub fn new() -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    /// Wrap an existing `reqwest::Client`
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(
        &self,
        endpoint: &str,
        headers: &[(String, String)],
        body: String,
    ) -> Result<HttpReply> {
        let mut request = self
            .http_client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.body(body).send().await.map_err(|e| {
            tracing::error!(endpoint = %endpoint, error = %e, "HTTP exchange failed");
            Error::HttpTransport {
                status: e.status().map(|s| s.as_u16()),
                payload: HttpErrorPayload::Opaque(e.to_string()),
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            tracing::error!(endpoint = %endpoint, status, error = %e, "Reading HTTP body failed");
            Error::HttpTransport {
                status: Some(status),
                payload: HttpErrorPayload::Opaque(e.to_string()),
            }
        })?;

        Ok(HttpReply { status, body })
    }
}

/// Configured HTTP endpoint with its extra headers and transport
#[derive(Clone)]
pub(crate) struct HttpEndpoint {
    pub(crate) url: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) transport: Arc<dyn HttpTransport>,
}

impl HttpEndpoint {
    /// Perform one exchange against this endpoint
    pub(crate) async fn post(&self, body: String) -> Result<HttpReply> {
        tracing::debug!(endpoint = %self.url, len = body.len(), "HTTP POST");
        self.transport.post(&self.url, &self.headers, body).await
    }
}

/// Error for a reply with a non-success status
pub(crate) fn failure_from_reply(reply: &HttpReply) -> Error {
    let payload = match serde_json::from_str::<Value>(&reply.body) {
        Ok(Value::Object(mut object)) if object.contains_key("error") => {
            let error = object.remove("error").unwrap_or(Value::Null);
            HttpErrorPayload::Rpc(JsonRpcErrorData::from_value(error))
        }
        _ => HttpErrorPayload::Opaque(reply.body.clone()),
    };

    tracing::error!(status = reply.status, payload = %payload, "HTTP endpoint returned an error status");
    Error::HttpTransport {
        status: Some(reply.status),
        payload,
    }
}

/// Outcome of a single (non-batch) call carried by `reply`
pub(crate) fn call_outcome(reply: &HttpReply, id: &Id) -> Result<Value> {
    if !reply.is_success() {
        return Err(failure_from_reply(reply));
    }

    let body = codec::decode_value(&reply.body).map_err(|_| {
        Error::Serialization(format!(
            "HTTP response body is not JSON: {}",
            truncate(&reply.body)
        ))
    })?;

    let mut object = match body {
        Value::Object(object) => object,
        other => {
            return Err(Error::Serialization(format!(
                "HTTP response body is not a JSON-RPC object: {}",
                other
            )))
        }
    };

    let reply_id = object
        .get("id")
        .and_then(|value| serde_json::from_value::<Id>(value.clone()).ok());
    if reply_id.as_ref() != Some(id) {
        tracing::warn!(id = %id, reply_id = ?reply_id, "HTTP response id does not match request");
    }

    if let Some(error) = object.remove("error") {
        return Err(Error::JsonRpc(JsonRpcErrorData::from_value(error)));
    }
    Ok(object.remove("result").unwrap_or(Value::Null))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
