// Integration tests for the chat server over TCP


use serde_json::json;
use simplechat::chatserver::{Lifecycle, ServerConfig};
use std::time::Duration;
use test_utils::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_eviction_walkthrough() {
    let server = start_server(2).await;

    for (nick, text) in [("a", "hi"), ("b", "yo"), ("c", "hey")] {
        let response = server
            .client(json!({"action": "post", "nick": nick, "text": text}))
            .await;
        assert_eq!(response, json!({"status": "ok", "timeout": 1000}));
    }

    let status = server
        .admin(json!({"action": "status", "token": TOKEN}))
        .await;
    assert_eq!(status, json!({"total": 3, "stored": 2, "size limit": 2}));

    // Message 1 was evicted; that is not an error
    let response = server.client(json!({"action": "get", "last": 0})).await;
    assert_eq!(
        response,
        json!({
            "status": "ok",
            "timeout": 1000,
            "messages": [
                {"who": "b", "n": 2, "text": "yo"},
                {"who": "c", "n": 3, "text": "hey"}
            ]
        })
    );

    let response = server.client(json!({"action": "get", "last": 3})).await;
    assert_eq!(
        response,
        json!({"status": "ok", "timeout": 1000, "messages": []})
    );

    let response = server.client(json!({"action": "get", "last": 99})).await;
    assert_eq!(response["status"], "err");
    let what = response["what"].as_str().unwrap();
    assert!(what.contains("99"));
    assert!(what.contains('3'));

    server.controller.begin_drain();
    server.wait_stopped().await;
}

#[tokio::test]
async fn test_wrong_token_changes_nothing() {
    let server = start_server(10).await;

    server
        .client(json!({"action": "post", "nick": "a", "text": "hi"}))
        .await;

    let denied = json!({"status": "err", "what": "Invalid password."});
    assert_eq!(
        server.admin(json!({"action": "status", "token": "guess"})).await,
        denied
    );
    assert_eq!(
        server
            .admin(json!({"action": "shutdown", "token": "guess", "timeout": 0}))
            .await,
        denied
    );
    assert_eq!(
        server.admin(json!({"action": "explode", "token": "guess"})).await,
        denied
    );

    // Server is still up and the log is untouched
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.controller.lifecycle(), Lifecycle::Running);
    let status = server
        .admin(json!({"action": "status", "token": TOKEN}))
        .await;
    assert_eq!(status, json!({"total": 1, "stored": 1, "size limit": 10}));

    server.controller.begin_drain();
    server.wait_stopped().await;
}

#[tokio::test]
async fn test_status_is_idempotent() {
    let server = start_server(10).await;

    let first = server
        .admin(json!({"action": "status", "token": TOKEN}))
        .await;
    let second = server
        .admin(json!({"action": "status", "token": TOKEN}))
        .await;
    assert_eq!(first, second);
    assert!(first.get("status").is_none());

    server.controller.begin_drain();
    server.wait_stopped().await;
}

#[tokio::test]
async fn test_malformed_requests_get_error_replies() {
    let server = start_server(10).await;

    let reply = server.client_raw(b"\xff\xfe\xfd").await;
    assert_eq!(
        reply,
        json!({"status": "err", "what": "Unicode error: check message encoding to be utf-8"})
    );

    let reply = server.client_raw(br#"{"action": "get", "la"#).await;
    assert_eq!(reply["status"], "err");
    assert!(reply["what"].as_str().unwrap().starts_with("JSON error: "));

    let reply = server.client_raw(br#"{"action": "get"}"#).await;
    assert_eq!(
        reply,
        json!({"status": "err", "what": "Request format error: no \"last\" field specified"})
    );

    let reply = server.client_raw(br#"{"action": "delete", "n": 1}"#).await;
    assert_eq!(
        reply,
        json!({"status": "err", "what": "Request format error: invalid action is passed (delete)"})
    );

    // Bad requests never touch the log
    let status = server
        .admin(json!({"action": "status", "token": TOKEN}))
        .await;
    assert_eq!(status["total"], 0);

    server.controller.begin_drain();
    server.wait_stopped().await;
}

#[tokio::test]
async fn test_oversized_request_rejected() {
    let server = start_with(ServerConfig {
        max_request_bytes: 64,
        ..ServerConfig::ephemeral()
    })
    .await;

    let text = "x".repeat(200);
    let reply = server
        .client(json!({"action": "post", "nick": "a", "text": text}))
        .await;
    assert_eq!(
        reply,
        json!({"status": "err", "what": "Request format error: request exceeds 64 bytes"})
    );

    server.controller.begin_drain();
    server.wait_stopped().await;
}

#[tokio::test]
async fn test_multi_megabyte_request_gets_reply() {
    let server = start_with(ServerConfig {
        max_request_bytes: 64,
        ..ServerConfig::ephemeral()
    })
    .await;

    // Far more than the socket buffers hold, so the server has to read past the cap
    let text = "x".repeat(4 * 1024 * 1024);
    let reply = server
        .client(json!({"action": "post", "nick": "a", "text": text}))
        .await;
    assert_eq!(
        reply,
        json!({"status": "err", "what": "Request format error: request exceeds 64 bytes"})
    );

    // Nothing was stored and the endpoint keeps serving
    let reply = server.admin(json!({"action": "status", "token": TOKEN})).await;
    assert_eq!(reply["total"], 0);
    let reply = server.client(json!({"action": "get", "last": 0})).await;
    assert_eq!(reply["messages"], json!([]));

    server.controller.begin_drain();
    server.wait_stopped().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_posts_are_sequenced() {
    let server = start_server(100).await;

    let mut handles = Vec::new();
    for i in 0..20 {
        let addr = server.client;
        handles.push(tokio::spawn(async move {
            let request = json!({"action": "post", "nick": format!("n{}", i), "text": "hi"});
            simplechat::chatserver::send_request(addr, &request)
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap()["status"], "ok");
    }

    let response = server.client(json!({"action": "get", "last": 0})).await;
    let sequences: Vec<u64> = response["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["n"].as_u64().unwrap())
        .collect();
    assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());

    server.controller.begin_drain();
    server.wait_stopped().await;
}

#[tokio::test]
async fn test_delayed_shutdown_stops_both_endpoints() {
    let server = start_server(10).await;
    let mut lifecycle = server.controller.subscribe();

    let reply = server
        .admin(json!({"action": "shutdown", "token": TOKEN, "timeout": 300}))
        .await;
    assert_eq!(reply, json!({"status": "ok"}));
    assert_eq!(*lifecycle.borrow_and_update(), Lifecycle::ShutdownScheduled);

    // Still serving until the deadline
    let reply = server
        .client(json!({"action": "post", "nick": "a", "text": "last words"}))
        .await;
    assert_eq!(reply["status"], "ok");

    // A second shutdown does not replace the pending one
    let reply = server
        .admin(json!({"action": "shutdown", "token": TOKEN, "timeout": 0}))
        .await;
    assert_eq!(
        reply,
        json!({"status": "err", "what": "shutdown is already scheduled"})
    );

    let client = server.client;
    let admin = server.admin;
    let controller = server.controller.clone();
    server.wait_stopped().await;

    assert_eq!(controller.lifecycle(), Lifecycle::Stopped);
    assert!(TcpStream::connect(client).await.is_err());
    assert!(TcpStream::connect(admin).await.is_err());
}

#[tokio::test]
async fn test_immediate_shutdown() {
    let server = start_server(10).await;

    let reply = server
        .admin(json!({"action": "shutdown", "token": TOKEN, "timeout": 0}))
        .await;
    assert_eq!(reply, json!({"status": "ok"}));

    let client = server.client;
    server.wait_stopped().await;

    assert!(TcpStream::connect(client).await.is_err());
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_connections() {
    let server = start_server(10).await;

    // A client that never finishes its request
    let mut stalled = TcpStream::connect(server.client).await.unwrap();
    stalled.write_all(br#"{"action": "get", "#).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reply = server
        .admin(json!({"action": "shutdown", "token": TOKEN, "timeout": 50}))
        .await;
    assert_eq!(reply["status"], "ok");

    server.wait_stopped().await;

    // The stalled connection was torn down without a reply
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), stalled.read_to_end(&mut buf))
        .await
        .expect("Stalled connection was left open");
    match read {
        Ok(n) => assert_eq!(n, 0),
        Err(_) => {} // reset by peer
    }
}
