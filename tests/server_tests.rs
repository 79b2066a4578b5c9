//! Integration tests for the server bootstrap.
//!
//! These drive the real bind/serve/shutdown path on loopback ports,
//! injecting synthetic shutdown signals instead of raising OS signals.

use std::io::Read;
use std::net::TcpListener;
use std::time::Duration;

use quarry::config::AppConfig;
use quarry::db;
use quarry::http::shutdown::{self, ShutdownOutcome, ShutdownSignal};
use quarry::http::{self, ListenerState, ServerError, ServerHandle};
use quarry::routes::create_router;
use quarry::state::AppState;

/// A port that was free a moment ago.
fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn test_config(port: u16, extra_http: &str) -> AppConfig {
    toml::from_str(&format!(
        "[http]\nip = \"127.0.0.1\"\nport = {}\n{}\n",
        port, extra_http
    ))
    .unwrap()
}

/// Spawn the real server; the returned handle observes and controls it.
fn spawn_server(
    config: AppConfig,
) -> (
    ServerHandle,
    tokio::task::JoinHandle<Result<(), ServerError>>,
) {
    let handle = ServerHandle::new();
    let app = create_router(AppState::new(config.clone()));
    let server_handle = handle.clone();
    let task = tokio::spawn(async move { http::start_server(app, &config, server_handle).await });
    (handle, task)
}

async fn wait_for_listening(handle: &ServerHandle) -> std::net::SocketAddr {
    let addr = handle
        .listening()
        .await
        .expect("server should start listening");
    let mut states = handle.subscribe();
    while *states.borrow() != ListenerState::Listening {
        states.changed().await.expect("state channel closed");
    }
    addr
}

#[tokio::test(flavor = "multi_thread")]
async fn serves_and_drains_on_shutdown_signal() {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(free_port(), "");
    let db_config: quarry::config::DbConfig =
        toml::from_str(&format!("dir = \"{}\"", tmp.path().display())).unwrap();

    // Storage readiness gates startup.
    db::ready(&db_config).await.unwrap();

    let (handle, server) = spawn_server(config);
    let (tx, rx) = async_channel::bounded(1);
    let coordinator = tokio::spawn(shutdown::drive(handle.clone(), rx));

    let addr = wait_for_listening(&handle).await;
    let body = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("ok"));

    tx.send(ShutdownSignal::Terminate).await.unwrap();
    drop(tx);

    let outcome = coordinator.await.unwrap();
    assert_eq!(outcome, ShutdownOutcome::DrainStarted);

    let result = tokio::time::timeout(Duration::from_secs(10), server)
        .await
        .expect("server should stop once drained")
        .unwrap();
    assert!(result.is_ok(), "graceful shutdown failed: {:?}", result);
    assert_eq!(handle.state(), ListenerState::Closed);
}

#[tokio::test(flavor = "multi_thread")]
async fn falls_back_to_free_port_when_configured_port_is_taken() {
    let blocker = TcpListener::bind("127.0.0.1:0").unwrap();
    let taken = blocker.local_addr().unwrap().port();

    let (handle, server) = spawn_server(test_config(taken, ""));
    let addr = wait_for_listening(&handle).await;
    assert_ne!(addr.port(), taken);

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status(), 200);

    handle.graceful_shutdown();
    server.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn base_url_prefixes_every_route() {
    let config = test_config(free_port(), "base_url = \"/workbench\"");

    let (handle, server) = spawn_server(config);
    let addr = wait_for_listening(&handle).await;

    let prefixed = reqwest::get(format!("http://{}/workbench/health", addr))
        .await
        .unwrap();
    assert_eq!(prefixed.status(), 200);

    let unprefixed = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(unprefixed.status(), 404);

    handle.graceful_shutdown();
    server.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_connections_are_closed_after_timeout() {
    let config = test_config(free_port(), "timeout_seconds = 1");

    let (handle, server) = spawn_server(config);
    let addr = wait_for_listening(&handle).await;

    // Hold a connection open without sending anything.
    let mut stream = std::net::TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let mut buf = Vec::new();
    match stream.read_to_end(&mut buf) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {}
        Err(e) => panic!("idle connection was not closed by the server: {}", e),
    }

    handle.graceful_shutdown();
    server.await.unwrap().unwrap();
}
