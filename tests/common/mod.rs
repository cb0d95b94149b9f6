//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use aio_dashboard::config::{Environment, Settings};
use aio_dashboard::core::StdContext;
use aio_dashboard::depends::{Database, DependError, Dependency, MemoryCache, Role};
use aio_dashboard::BackendServer;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

/// Database double whose health can be flipped at runtime.
#[derive(Debug, Default)]
pub struct FakeDatabase {
    pub read_down: AtomicBool,
    pub closed: AtomicU32,
}

#[async_trait]
impl Database for FakeDatabase {
    async fn ping(&self, ctx: &StdContext, role: Role) -> Result<(), DependError> {
        if ctx.is_cancelled() {
            return Err(aio_dashboard::core::Cancelled.into());
        }
        if role == Role::Read && self.read_down.load(Ordering::SeqCst) {
            return Err(DependError::Unavailable {
                backend: "postgresql",
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn close(&self, _role: Role) -> Result<(), DependError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn dependency(db: &Arc<FakeDatabase>) -> Dependency {
    Dependency::new(
        Some(Arc::clone(db) as Arc<dyn Database>),
        Arc::new(MemoryCache::new()),
    )
}

pub fn server(depend: Dependency) -> BackendServer {
    BackendServer::new(Arc::new(Settings::default()), Environment::Fat, depend, None)
}

/// Drive one request through `router` and decode a JSON body, or `Null`
/// when the body is empty.
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
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, headers, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Plain HTTP/1.1 GET over a fresh TCP connection.
pub async fn raw_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}
