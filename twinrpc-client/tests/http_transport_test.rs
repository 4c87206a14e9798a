//! HTTP transport integration tests
//!
//! Calls, notifications and batches over HTTP, first through a recording
//! transport and then through reqwest against a mockito server.

mod common;

use common::{echo_responder, eventually, init_tracing, within, RecordingHttpTransport};
use mockito::Matcher;
use serde_json::{json, Value};
use twinrpc_client::{ClientBuilder, TransportKind};
use twinrpc_core::{Error, HttpErrorPayload};

const ENDPOINT: &str = "http://rpc.test/api";

#[tokio::test]
async fn test_http_call_forwards_headers() {
    let http = RecordingHttpTransport::new().reply(200, r#"{"jsonrpc":"2.0","id":1,"result":5}"#);
    let client = ClientBuilder::new()
        .http_endpoint(ENDPOINT)
        .http_transport(http.clone())
        .header("Authorization", "Bearer token")
        .headers(vec![("X-Trace", "abc")])
        .build()
        .unwrap();

    let sum: i64 = within(client.request("add", json!([2, 3]))).await.unwrap();
    assert_eq!(sum, 5);

    let posts = http.posts();
    assert_eq!(
        posts[0].headers,
        vec![
            ("Authorization".to_string(), "Bearer token".to_string()),
            ("X-Trace".to_string(), "abc".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_http_error_member_on_success_status() {
    let http = RecordingHttpTransport::new().reply(
        200,
        r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Invalid params"}}"#,
    );
    let client = ClientBuilder::new()
        .http_endpoint(ENDPOINT)
        .http_transport(http)
        .build()
        .unwrap();

    match within(client.call("add", json!([])).unwrap()).await {
        Err(Error::JsonRpc(error)) => assert_eq!(error.code, -32602),
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_error_status_with_rpc_body() {
    let http = RecordingHttpTransport::new().reply(
        500,
        r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32603,"message":"Internal error","data":"db down"}}"#,
    );
    let client = ClientBuilder::new()
        .http_endpoint(ENDPOINT)
        .http_transport(http)
        .build()
        .unwrap();

    match within(client.call("add", json!([])).unwrap()).await {
        Err(Error::HttpTransport {
            status: Some(500),
            payload: HttpErrorPayload::Rpc(error),
        }) => {
            assert_eq!(error.code, -32603);
            assert_eq!(error.data, Some(json!("db down")));
        }
        other => panic!("expected HTTP transport error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_error_status_with_opaque_body() {
    let http = RecordingHttpTransport::new().reply(502, "<h1>Bad Gateway</h1>");
    let client = ClientBuilder::new()
        .http_endpoint(ENDPOINT)
        .http_transport(http)
        .build()
        .unwrap();

    match within(client.call("add", json!([])).unwrap()).await {
        Err(Error::HttpTransport {
            status: Some(502),
            payload: HttpErrorPayload::Opaque(body),
        }) => assert_eq!(body, "<h1>Bad Gateway</h1>"),
        other => panic!("expected opaque payload, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_notify() {
    let http = RecordingHttpTransport::new().reply(204, "");
    let client = ClientBuilder::new()
        .http_endpoint(ENDPOINT)
        .http_transport(http.clone())
        .build()
        .unwrap();

    assert_eq!(
        client.notify("log", json!({"msg": "hi"})).unwrap(),
        TransportKind::Http
    );
    assert!(eventually(|| http.posts().len() == 1).await);
    assert_eq!(
        http.posts()[0].body,
        r#"{"jsonrpc":"2.0","method":"log","params":{"msg":"hi"}}"#
    );
}

#[tokio::test]
async fn test_http_batch_single_exchange() {
    let http = RecordingHttpTransport::responding(echo_responder);
    let client = ClientBuilder::new()
        .http_endpoint(ENDPOINT)
        .http_transport(http.clone())
        .build()
        .unwrap();

    let mut batch = client.batch();
    let first = batch.call("alpha", json!([])).unwrap();
    batch.notify("ping", json!([])).unwrap();
    let second = batch.call("beta", json!({"x": 1})).unwrap();
    assert_eq!(batch.len(), 3);

    let handle = batch.execute().unwrap();
    assert_eq!(handle.transport(), Some(TransportKind::Http));
    let results = within(handle).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].get::<Value>().unwrap(), json!({"echo": "alpha"}));
    assert_eq!(results[1].get::<Value>().unwrap(), json!({"echo": "beta"}));
    assert_eq!(within(first).await.unwrap(), json!({"echo": "alpha"}));
    assert_eq!(within(second).await.unwrap(), json!({"echo": "beta"}));

    let posts = http.posts();
    assert_eq!(posts.len(), 1);
    let body: Value = serde_json::from_str(&posts[0].body).unwrap();
    assert_eq!(body.as_array().unwrap().len(), 3);
    assert!(body[1].get("id").is_none());
}

#[tokio::test]
async fn test_http_batch_reordered_reply() {
    let http = RecordingHttpTransport::new().reply(
        200,
        r#"[{"jsonrpc":"2.0","id":2,"result":"b"},{"jsonrpc":"2.0","id":1,"result":"a"}]"#,
    );
    let client = ClientBuilder::new()
        .http_endpoint(ENDPOINT)
        .http_transport(http)
        .build()
        .unwrap();

    let mut batch = client.batch();
    batch.call("a", json!([])).unwrap();
    batch.call("b", json!([])).unwrap();

    let results = within(batch.execute().unwrap()).await.unwrap();
    let outcomes: Vec<Value> = results
        .into_iter()
        .map(|r| r.outcome.unwrap())
        .collect();
    assert_eq!(outcomes, vec![json!("a"), json!("b")]);
}

#[tokio::test]
async fn test_http_batch_exchange_failure_fails_every_entry() {
    init_tracing();
    let http = RecordingHttpTransport::new().fail_with(Error::HttpTransport {
        status: None,
        payload: HttpErrorPayload::Opaque("connection refused".to_string()),
    });
    let client = ClientBuilder::new()
        .http_endpoint(ENDPOINT)
        .http_transport(http)
        .build()
        .unwrap();

    let mut batch = client.batch();
    let a = batch.call("a", json!([])).unwrap();
    let b = batch.call("b", json!([])).unwrap();

    let aggregate = within(batch.execute().unwrap()).await;
    assert!(matches!(aggregate, Err(Error::HttpTransport { status: None, .. })));
    assert!(matches!(within(a).await, Err(Error::HttpTransport { .. })));
    assert!(matches!(within(b).await, Err(Error::HttpTransport { .. })));
}

#[tokio::test]
async fn test_http_batch_rejected_by_server_completes() {
    init_tracing();
    let http = RecordingHttpTransport::new().reply(
        200,
        r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32600,"message":"Invalid Request"}}"#,
    );
    let client = ClientBuilder::new()
        .http_endpoint(ENDPOINT)
        .http_transport(http)
        .build()
        .unwrap();

    let mut batch = client.batch();
    let a = batch.call("a", json!([])).unwrap();
    let b = batch.call("b", json!([])).unwrap();

    // The aggregate completes; only each call carries the server's error.
    let results = within(batch.execute().unwrap()).await.unwrap();
    let ids: Vec<u64> = results.iter().map(|r| r.id.as_u64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2]);
    for result in &results {
        assert!(matches!(result.outcome, Err(Error::JsonRpc(ref e)) if e.code == -32600));
    }
    assert!(matches!(within(a).await, Err(Error::JsonRpc(_))));
    assert!(matches!(within(b).await, Err(Error::JsonRpc(_))));
}

#[tokio::test]
async fn test_empty_batch_sends_nothing() {
    let http = RecordingHttpTransport::new();
    let client = ClientBuilder::new()
        .http_endpoint(ENDPOINT)
        .http_transport(http.clone())
        .build()
        .unwrap();

    let batch = client.batch();
    assert!(batch.is_empty());
    let handle = batch.execute().unwrap();
    assert_eq!(handle.transport(), None);
    assert!(within(handle).await.unwrap().is_empty());
    assert!(http.posts().is_empty());
}

#[tokio::test]
async fn test_reqwest_transport_against_mock_server() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/rpc")
        .match_header("content-type", "application/json")
        .match_header("x-api-key", "secret")
        .match_body(Matcher::Json(json!({
            "jsonrpc": "2.0",
            "method": "ping",
            "params": [],
            "id": 1
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#)
        .create_async()
        .await;

    let client = ClientBuilder::new()
        .http_endpoint(format!("{}/rpc", server.url()))
        .header("x-api-key", "secret")
        .build()
        .unwrap();

    let result: String = within(client.request("ping", json!([]))).await.unwrap();
    assert_eq!(result, "pong");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_reqwest_transport_error_status() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/rpc")
        .with_status(404)
        .with_body("no such endpoint")
        .create_async()
        .await;

    let client = ClientBuilder::new()
        .http_endpoint(format!("{}/rpc", server.url()))
        .build()
        .unwrap();

    match within(client.call("ping", json!([])).unwrap()).await {
        Err(Error::HttpTransport {
            status: Some(404),
            payload: HttpErrorPayload::Opaque(body),
        }) => assert_eq!(body, "no such endpoint"),
        other => panic!("expected 404, got {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_reqwest_transport_batch() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/rpc")
        .match_body(Matcher::Regex(r#"^\[.*"method":"a".*"method":"b".*\]$"#.to_string()))
        .with_status(200)
        .with_body(r#"[{"jsonrpc":"2.0","id":1,"result":1},{"jsonrpc":"2.0","id":2,"result":2}]"#)
        .create_async()
        .await;

    let client = ClientBuilder::new()
        .http_endpoint(format!("{}/rpc", server.url()))
        .build()
        .unwrap();

    let mut batch = client.batch();
    batch.call("a", json!([])).unwrap();
    batch.call("b", json!([])).unwrap();
    let results = within(batch.execute().unwrap()).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_success()));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_reqwest_transport_connect_failure() {
    let client = ClientBuilder::new()
        .http_endpoint("http://127.0.0.1:1/rpc")
        .build()
        .unwrap();

    assert!(matches!(
        within(client.call("ping", json!([])).unwrap()).await,
        Err(Error::HttpTransport { status: None, .. })
    ));
}
