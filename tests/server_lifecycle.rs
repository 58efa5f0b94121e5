//! Lifecycle tests against a real server on an ephemeral port.
//!
//! Each test constructs its own `Server`, so tests can run in parallel.

use std::time::{Duration, Instant};

use axum::{routing::get, Router};
use workshop::{Server, ServerConfig, ServerError, SHUTDOWN_TIMEOUT};

fn local_config() -> ServerConfig {
    ServerConfig {
        addr: "127.0.0.1:0".to_string(),
        ..Default::default()
    }
}

async fn open_server(router: Router) -> Server {
    let mut server = Server::new(local_config(), router);
    server.open().await.expect("server should open");
    server
}

fn base_url(server: &Server) -> String {
    // url() reports "localhost"; tests hit the loopback address directly.
    format!("http://127.0.0.1:{}", server.port())
}

#[tokio::test]
async fn open_with_empty_addr_assigns_ephemeral_port() {
    let mut server = Server::new(ServerConfig::default(), Router::new());
    server.open().await.expect("server should open");
    assert_ne!(server.port(), 0);
    server.close().await.expect("close should succeed");
}

#[tokio::test]
async fn helloworld_route_is_registered() {
    let mut server = open_server(Router::new()).await;

    let response = reqwest::get(format!("{}/helloworld", base_url(&server)))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "Hello World!\n");

    server.close().await.unwrap();
}

#[tokio::test]
async fn host_routes_are_served_alongside_the_builtin() {
    let host = Router::new().route("/custom", get(|| async { "custom" }));
    let mut server = open_server(host).await;

    let response = reqwest::get(format!("{}/custom", base_url(&server)))
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "custom");

    server.close().await.unwrap();
}

#[tokio::test]
async fn url_reflects_scheme_and_bound_port() {
    let mut server = open_server(Router::new()).await;
    assert_eq!(server.scheme(), "http");
    assert_eq!(server.url(), format!("http://localhost:{}", server.port()));
    server.close().await.unwrap();
}

#[tokio::test]
async fn second_open_fails_explicitly() {
    let mut server = open_server(Router::new()).await;
    assert!(matches!(server.open().await, Err(ServerError::AlreadyOpen)));
    server.close().await.unwrap();
}

#[tokio::test]
async fn open_after_close_fails_explicitly() {
    let mut server = open_server(Router::new()).await;
    server.close().await.unwrap();
    assert!(matches!(server.open().await, Err(ServerError::AlreadyOpen)));
}

#[tokio::test]
async fn close_waits_for_inflight_request_to_drain() {
    let host = Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            "done"
        }),
    );
    let mut server = open_server(host).await;
    let url = format!("{}/slow", base_url(&server));

    let request = tokio::spawn(async move { reqwest::get(url).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    server.close().await.expect("request drains within the window");
    let elapsed = start.elapsed();

    // Close returns only after the in-flight request finished, well inside
    // the shutdown window.
    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < SHUTDOWN_TIMEOUT, "{elapsed:?}");

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.text().await.unwrap(), "done");
}

#[tokio::test]
async fn close_times_out_when_request_outlives_the_window() {
    let host = Router::new().route(
        "/hang",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            "too late"
        }),
    );
    let mut server = open_server(host).await;
    let url = format!("{}/hang", base_url(&server));

    let request = tokio::spawn(async move { reqwest::get(url).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    let result = server.close().await;
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(ServerError::ShutdownTimeout(_))));
    assert!(elapsed >= Duration::from_millis(900), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");

    // The hanging request was force-closed; the client sees a failure.
    request.await.unwrap().expect_err("connection was force-closed");
}
