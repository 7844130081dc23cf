//! Integration tests for sync sessions over scripted and real transports.

use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tablesync_engine::{
    shared_view, CollectionClient, CursorFetcher, HttpEndpointResolver, MemoryView, RetryConfig,
    ScriptedCollection, ScriptedConnector, ScriptedSession, StaticResolver, SyncConfig, SyncError,
    SyncMode, SyncOrchestrator, WebSocketConnector,
};
use tablesync_protocol::{
    ConnectionInfo, Cursor, KeyPath, PullResponse, RequiredFields, WEBPUBSUB_JSON_PROTOCOL,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn scripted(
    config: SyncConfig,
) -> (
    Arc<ScriptedConnector>,
    Arc<ScriptedCollection>,
    SyncOrchestrator<StaticResolver, ScriptedConnector, ScriptedCollection>,
) {
    let resolver = Arc::new(StaticResolver::new(ConnectionInfo::new("ws://localhost/client")));
    let connector = Arc::new(ScriptedConnector::new());
    let source = Arc::new(ScriptedCollection::new());
    let orchestrator = SyncOrchestrator::from_shared(
        config,
        resolver,
        Arc::clone(&connector),
        Arc::clone(&source),
    );
    (connector, source, orchestrator)
}

/// Serves the connection-info and collection endpoints until the test ends.
async fn serve_http(ws_url: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let head = String::from_utf8_lossy(&buf).to_string();
            let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();

            let body = if target.starts_with("/api/websocketinfo") {
                json!({"url": ws_url, "protocol": WEBPUBSUB_JSON_PROTOCOL}).to_string()
            } else if target.contains("last_version=") {
                json!({"version": 2, "messages": []}).to_string()
            } else {
                json!({
                    "version": 2,
                    "messages": [
                        {"version": 1, "message": {"id": "m1", "data": "first"}},
                        {"version": 2, "message": {"id": "m2", "data": "second"}}
                    ]
                })
                .to_string()
            };
            let reply = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
    });

    base
}

/// Accepts push channels and sends one broker-wrapped record on each.
async fn serve_ws() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/client/hubs/messages", listener.local_addr().unwrap());

    tokio::spawn(async move {
        loop {
            let (tcp, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let callback = |_req: &Request,
                                mut resp: Response|
                 -> Result<Response, ErrorResponse> {
                    resp.headers_mut().insert(
                        SEC_WEBSOCKET_PROTOCOL,
                        HeaderValue::from_static(WEBPUBSUB_JSON_PROTOCOL),
                    );
                    Ok(resp)
                };
                let mut ws = tokio_tungstenite::accept_hdr_async(tcp, callback).await.unwrap();
                let frames = [
                    json!({"type": "system", "event": "connected", "connectionId": "c1"}),
                    json!({
                        "type": "message",
                        "from": "group",
                        "dataType": "json",
                        "data": {"message": {"id": "ignored"}}
                    }),
                    json!({
                        "type": "message",
                        "from": "server",
                        "dataType": "json",
                        "data": {"version": 3, "message": {"id": "m3", "data": "pushed"}}
                    }),
                ];
                for frame in frames {
                    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
                }
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    url
}

#[tokio::test]
async fn push_and_pull_converge_over_http_and_websocket() {
    let ws_url = serve_ws().await;
    let base = serve_http(ws_url).await;

    let config = SyncConfig::new(base)
        .with_key_path(KeyPath::new("/message/id"))
        .with_fallback_interval(Duration::from_millis(200))
        .with_request_timeout(Duration::from_secs(5));
    let orchestrator = SyncOrchestrator::new(
        config.clone(),
        HttpEndpointResolver::from_config(&config).unwrap(),
        WebSocketConnector::new(),
        CursorFetcher::from_config(&config).unwrap(),
    );

    let session = orchestrator.start(SyncMode::PushWithFallback, shared_view(MemoryView::new()));
    eventually(|| session.view().lock().len() == 3).await;

    {
        let view = session.view().lock();
        assert_eq!(view.get("m1").unwrap()["message"]["data"], "first");
        assert_eq!(view.get("m3").unwrap()["message"]["data"], "pushed");
        assert!(view.get("ignored").is_none());
    }
    assert_eq!(session.cursor().await, Some(Cursor::from(2)));

    // Later polls return nothing new and the view stays as it is.
    eventually(|| session.stats().polls >= 3).await;
    assert_eq!(session.view().lock().len(), 3);
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn push_session_survives_reconnects() {
    let config = SyncConfig::new("http://localhost")
        .with_retry(RetryConfig::fixed(Duration::from_millis(500)));
    let (connector, _source, orchestrator) = scripted(config);
    connector.push(ScriptedSession::Frames(vec![r#"{"id":"a","v":1}"#.into()]));
    connector.push(ScriptedSession::Refuse("connection refused".into()));
    connector.push(ScriptedSession::Hold(vec![r#"[{"id":"a","v":2},{"id":"b"}]"#.into()]));

    let session = orchestrator.start(SyncMode::Push, shared_view(MemoryView::new()));
    eventually(|| session.view().lock().len() == 2).await;

    assert_eq!(session.view().lock().get("a"), Some(&json!({"id": "a", "v": 2})));
    let stats = session.connection_stats().unwrap();
    assert_eq!(stats.opened, 2);
    assert_eq!(stats.reconnects, 2);

    let connects = connector.connects();
    assert_eq!(connects.len(), 3);
    for pair in connects.windows(2) {
        assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(500));
    }
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn pull_session_applies_each_batch_once() {
    let (_connector, source, orchestrator) = scripted(SyncConfig::new("http://localhost"));
    source.push_response(PullResponse::new(
        vec![json!({"id": "a", "v": 1}), json!({"id": "b", "v": 1})],
        Some(Cursor::from("v1")),
    ));
    source.push_response(PullResponse::new(
        vec![json!({"id": "a", "v": 2})],
        Some(Cursor::from("v2")),
    ));

    let session = orchestrator.start(SyncMode::Pull, shared_view(MemoryView::new()));
    eventually(|| source.requests().len() >= 3).await;

    assert_eq!(
        source.requests()[..3],
        [None, Some(Cursor::from("v1")), Some(Cursor::from("v2"))]
    );
    let view = session.view().lock().clone();
    assert_eq!(view.len(), 2);
    assert_eq!(view.get("a"), Some(&json!({"id": "a", "v": 2})));

    let stats = session.stats();
    assert_eq!(stats.records_inserted, 2);
    assert_eq!(stats.records_replaced, 1);
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn sessions_are_independent() {
    let (first_connector, _first_source, first) = scripted(SyncConfig::new("http://localhost"));
    let (second_connector, _second_source, second) = scripted(SyncConfig::new("http://localhost"));
    first_connector.push(ScriptedSession::Hold(vec![r#"{"id":"one"}"#.into()]));
    second_connector.push(ScriptedSession::Hold(vec![r#"{"id":"two"}"#.into()]));

    let a = first.start(SyncMode::Push, shared_view(MemoryView::new()));
    let b = second.start(SyncMode::Push, shared_view(MemoryView::new()));
    eventually(|| a.stats().batches_applied == 1 && b.stats().batches_applied == 1).await;

    a.stop().await;
    assert!(b.connection_state().unwrap().is_open());
    assert!(b.view().lock().get("two").is_some());
    assert!(b.view().lock().get("one").is_none());
    b.stop().await;
}

#[tokio::test]
async fn invalid_record_is_rejected_before_any_request() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = CollectionClient::from_config(&SyncConfig::new(base))
        .unwrap()
        .with_rules(RequiredFields::new().require("/customer").require_elements("/items"));

    let err = client.create(&json!({"items": [1, null]})).await.unwrap_err();
    match err {
        SyncError::Validation(e) => assert_eq!(e.errors.len(), 2),
        other => panic!("expected validation error, got {other:?}"),
    }
}
