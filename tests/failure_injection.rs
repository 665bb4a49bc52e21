//! Failure injection: dead, slow and erroring backends behind the gateway.

use std::time::Duration;

use edge_gateway::config::QuotaClass;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

mod common;

use common::{base_config, client, refused_url, service, MockBackend, TestGateway, GOOD_TOKEN};

/// Sends a response head promising more body than it ever writes.
async fn stalling_body_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let head = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"rows\":[";
                let _ = socket.write_all(head.as_bytes()).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    format!("http://{}", addr)
}

/// Accepts connections and never answers.
async fn hanging_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

async fn get(gw: &TestGateway, path: &str) -> (StatusCode, Value) {
    let res = client()
        .get(gw.url(path))
        .bearer_auth(GOOD_TOKEN)
        .send()
        .await
        .unwrap();
    let status = res.status();
    (status, res.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_breaker_short_circuits_dead_backend() {
    let mut config = base_config(vec![service(
        "cart",
        "/cart",
        refused_url().await,
        QuotaClass::Default,
    )]);
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.cooldown_ms = 60_000;
    let gw = TestGateway::start(config).await;

    let (status, body) = get(&gw, "/api/v1/cart").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Service unavailable");
    assert_eq!(body["service"], "cart");

    // The second refusal reaches the threshold.
    let (status, body) = get(&gw, "/api/v1/cart").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Service temporarily unavailable");

    let (status, body) = get(&gw, "/api/v1/cart/items").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Service temporarily unavailable");
    assert!(body["details"].as_str().unwrap().contains("OPEN"));

    gw.stop().await;
}

#[tokio::test]
async fn test_backend_5xx_is_relayed() {
    let reports = MockBackend::start(500, r#"{"message":"db down"}"#).await;
    let mut config = base_config(vec![service(
        "reporting",
        "/reports",
        reports.url(),
        QuotaClass::Default,
    )]);
    config.circuit_breaker.failure_threshold = 1;
    let gw = TestGateway::start(config).await;

    for _ in 0..3 {
        let (status, body) = get(&gw, "/api/v1/reports/daily").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "db down");
    }
    // Answers, even 5xx, never open the breaker.
    assert_eq!(reports.hits(), 3);

    gw.stop().await;
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let mut slow = service("catalog", "/catalog", hanging_backend().await, QuotaClass::Default);
    slow.timeout_ms = 200;
    let gw = TestGateway::start(base_config(vec![slow])).await;

    let started = std::time::Instant::now();
    let (status, body) = get(&gw, "/api/v1/catalog/items").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"], "Service request timeout");
    assert!(started.elapsed() < Duration::from_secs(5));

    gw.stop().await;
}

#[tokio::test]
async fn test_details_hidden_in_production() {
    let mut config = base_config(vec![service(
        "cart",
        "/cart",
        refused_url().await,
        QuotaClass::Default,
    )]);
    config.environment = edge_gateway::config::Environment::Production;
    let gw = TestGateway::start(config).await;

    let (status, body) = get(&gw, "/api/v1/cart").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.get("details").is_none());

    gw.stop().await;
}

#[tokio::test]
async fn test_health_all_degraded_when_backend_down() {
    let catalog = MockBackend::start(200, r#"{"status":"healthy"}"#).await;
    let gw = TestGateway::start(base_config(vec![
        service("catalog", "/catalog", catalog.url(), QuotaClass::Default),
        service("cart", "/cart", refused_url().await, QuotaClass::Default),
    ]))
    .await;

    let res = client().get(gw.url("/health/all")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "degraded");

    let services = body["services"].as_array().unwrap();
    let status_of = |name: &str| {
        services
            .iter()
            .find(|s| s["service"] == name)
            .map(|s| s["status"].clone())
            .unwrap()
    };
    assert_eq!(status_of("catalog"), "healthy");
    assert_eq!(status_of("cart"), "unhealthy");
    assert_eq!(status_of("gateway"), "healthy");

    gw.stop().await;
}

#[tokio::test]
async fn test_service_health_relays_or_reports_unhealthy() {
    let catalog = MockBackend::start(200, r#"{"status":"healthy","uptime":12}"#).await;
    let gw = TestGateway::start(base_config(vec![
        service("catalog", "/catalog", catalog.url(), QuotaClass::Default),
        service("cart", "/cart", refused_url().await, QuotaClass::Default),
    ]))
    .await;

    let res = client().get(gw.url("/health/catalog")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["uptime"], 12);

    let res = client().get(gw.url("/health/cart")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["service"], "cart");
    assert!(body["error"].is_string());

    let res = client().get(gw.url("/health/nope")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    gw.stop().await;
}

#[tokio::test]
async fn test_stalled_body_is_cut_off_and_counts_as_failure() {
    let mut reports = service("reporting", "/reports", stalling_body_backend().await, QuotaClass::Default);
    reports.timeout_ms = 200;
    let mut config = base_config(vec![reports]);
    config.circuit_breaker.failure_threshold = 1;
    config.circuit_breaker.cooldown_ms = 60_000;
    let gw = TestGateway::start(config).await;

    let started = std::time::Instant::now();
    let res = client()
        .get(gw.url("/api/v1/reports/daily"))
        .bearer_auth(GOOD_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.bytes().await.is_err());
    assert!(started.elapsed() < Duration::from_secs(3));

    let (status, body) = get(&gw, "/api/v1/reports/daily").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Service temporarily unavailable");

    gw.stop().await;
}
