//! Shared utilities for integration tests.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tower::ServiceExt;

use edge_resilience::config::AppConfig;
use edge_resilience::http::AppState;
use edge_resilience::observability::{Logger, MemorySink};

/// App state with a capturing logger.
pub fn test_state(debug: bool) -> (AppState, MemorySink) {
    let mut config = AppConfig::default();
    config.app.debug = debug;
    config.app.environment = "test".to_string();
    state_with(config)
}

pub fn state_with(config: AppConfig) -> (AppState, MemorySink) {
    let sink = MemorySink::new();
    let state = AppState::new(config, Logger::new(Arc::new(sink.clone())));
    (state, sink)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Drive the router once and decode the body as JSON (Null when empty).
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, headers, body)
}

/// What the mock backend saw.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub head: String,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    pub fn method(&self) -> &str {
        self.head.split_whitespace().next().unwrap_or_default()
    }
}

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` receives the request head and the 1-based request number and returns
/// `(status, json body)`. Returns the address and a request counter.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Arc<AtomicU32>)
where
    F: Fn(SeenRequest, u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);
    let count = Arc::new(AtomicU32::new(0));
    let counter = count.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let (status, body) = f(SeenRequest { head }, n).await;

                        let response_str = format!(
                            "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, count)
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let mut expected: Option<usize> = None;
    loop {
        if let Some(total) = expected {
            if buf.len() >= total {
                break;
            }
        } else if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = SeenRequest { head: String::from_utf8_lossy(&buf[..end]).into_owned() };
            let body_len = head
                .header("content-length")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            expected = Some(end + 4 + body_len);
            continue;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
