//! Retry wrapper: 5xx and transport failures retry with backoff, 4xx does not.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mimicry::{Backoff, ClientConfig, ConnectPhase, Error, ErrorKind, RequestOptions};

mod helpers;
use helpers::mock_server::{MockHttpServer, MockResponse};
use helpers::{client_with, CHROME_UA};

fn client() -> mimicry::BrowserClient {
    let backoff = Backoff::new(Duration::from_millis(20), Duration::from_millis(50));
    client_with(CHROME_UA, ClientConfig::builder().backoff(backoff))
}

#[tokio::test]
async fn test_recovers_after_server_errors() {
    let server = MockHttpServer::new().await.unwrap();
    let url = server.url();
    let log = server.log();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    server.start(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 3 {
            MockResponse::status(503)
        } else {
            MockResponse::ok("recovered")
        }
    });

    let started = Instant::now();
    let response = client().get_with_retry(&url, 3, RequestOptions::default()).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "recovered");
    assert_eq!(log.len(), 4);
    // 20 + 40 + 50 ms of backoff.
    assert!(started.elapsed() >= Duration::from_millis(110));
}

#[tokio::test]
async fn test_exhaustion_wraps_last_error() {
    let server = MockHttpServer::new().await.unwrap();
    let url = server.url();
    let log = server.log();
    server.start(|_| MockResponse::status(500));

    let err = client().get_with_retry(&url, 2, RequestOptions::default()).await.unwrap_err();
    assert_eq!(log.len(), 3);
    assert_eq!(err.kind(), ErrorKind::Retry);
    match err {
        Error::RetriesExhausted { retries, source } => {
            assert_eq!(retries, 2);
            assert!(matches!(*source, Error::HttpStatus { status: 500, .. }), "{source:?}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockHttpServer::new().await.unwrap();
    let url = server.url();
    let log = server.log();
    server.start(|_| MockResponse::status(404));

    let response = client().get_with_retry(&url, 5, RequestOptions::default()).await.unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn test_transport_failures_are_retried() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = client()
        .get_with_retry(&format!("http://127.0.0.1:{port}/"), 1, RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RetriesExhausted { retries: 1, .. }));
    assert_eq!(err.connect_phase(), Some(ConnectPhase::Dial));
}

#[tokio::test]
async fn test_zero_retries_is_single_attempt() {
    let server = MockHttpServer::new().await.unwrap();
    let url = server.url();
    let log = server.log();
    server.start(|_| MockResponse::status(503));

    let err = client().get_with_retry(&url, 0, RequestOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::RetriesExhausted { retries: 0, .. }));
    assert_eq!(log.len(), 1);
}

#[tokio::test]
async fn test_default_backoff_schedule() {
    let server = MockHttpServer::new().await.unwrap();
    let url = server.url();
    let log = server.log();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    server.start(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 3 {
            MockResponse::status(503)
        } else {
            MockResponse::ok("ok")
        }
    });

    let started = Instant::now();
    let response = helpers::chrome_client()
        .get_with_retry(&url, 3, RequestOptions::default())
        .await
        .unwrap();
    let elapsed = started.elapsed();
    assert_eq!(response.status(), 200);
    assert_eq!(log.len(), 4);
    // 1s + 2s + 4s.
    assert!(elapsed >= Duration::from_secs(7), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(10), "{elapsed:?}");
}
