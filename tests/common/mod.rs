//! Shared harness for gateway integration tests: raw-TCP mock backends and
//! an in-process gateway on an ephemeral port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use edge_gateway::config::{GatewayConfig, QuotaClass, ServiceConfig};
use edge_gateway::security::{TokenVerifier, VerifiedUser, VerifyError};
use edge_gateway::store::MemoryStore;
use edge_gateway::{AppState, HttpServer, Shutdown};

pub const GOOD_TOKEN: &str = "good-token";

/// A backend that answers every request with a fixed status and JSON body,
/// recording the request head it received.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub async fn start(status: u16, body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (h, r) = (hits.clone(), requests.clone());
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let (h, r) = (h.clone(), r.clone());
                tokio::spawn(async move {
                    let head = read_head(&mut socket).await;
                    h.fetch_add(1, Ordering::SeqCst);
                    r.lock().unwrap().push(head);
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        reason(status),
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, hits, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Head of the most recent request, lowercased for header lookups.
    pub fn last_request(&self) -> String {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
            .to_lowercase()
    }
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return String::from_utf8_lossy(&buf).into_owned(),
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            }
        }
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();

    // Drain the body so closing the socket doesn't reset the connection.
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut remaining = content_length.saturating_sub(buf.len() - head_end);
    while remaining > 0 {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => remaining = remaining.saturating_sub(n),
        }
    }
    head
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// An address nothing listens on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// Accepts [`GOOD_TOKEN`] and rejects everything else, counting calls.
#[derive(Default)]
pub struct StubVerifier {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TokenVerifier for StubVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if token == GOOD_TOKEN {
            Ok(VerifiedUser {
                user_id: "u-1".into(),
                role: "merchant".into(),
                merchant_id: Some("m-9".into()),
            })
        } else {
            Err(VerifyError::Invalid)
        }
    }
}

pub fn service(name: &str, prefix: &str, url: String, quota_class: QuotaClass) -> ServiceConfig {
    ServiceConfig {
        name: name.into(),
        path_prefix: prefix.into(),
        url,
        timeout_ms: 1000,
        health_check: false,
        quota_class,
    }
}

/// Baseline config: no background health polling, no default services.
pub fn base_config(services: Vec<ServiceConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.services = services;
    config.health_check.enabled = false;
    config.health_check.on_demand_timeout_ms = 500;
    config.docs.enabled = false;
    config
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub verifier: Arc<StubVerifier>,
    pub shutdown: Shutdown,
    handle: JoinHandle<()>,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig) -> Self {
        let verifier = Arc::new(StubVerifier::default());
        let store = Arc::new(MemoryStore::new());
        let state = AppState::with_verifier(config, store, verifier.clone()).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let server = HttpServer::new(state);
        let stop = shutdown.clone();
        let handle = tokio::spawn(async move {
            let _ = server.run(listener, stop).await;
        });

        Self {
            addr,
            verifier,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn verify_calls(&self) -> usize {
        self.verifier.calls.load(Ordering::SeqCst)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.handle.await;
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
