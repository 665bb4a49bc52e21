//! Admin API: key check, status and breaker management.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use edge_gateway::admin::setup_admin_router;
use edge_gateway::config::QuotaClass;
use edge_gateway::store::MemoryStore;
use edge_gateway::AppState;
use serde_json::Value;
use tower::ServiceExt;

mod common;

use common::{base_config, service, StubVerifier};

fn state() -> AppState {
    let mut config = base_config(vec![service(
        "catalog",
        "/catalog",
        "http://127.0.0.1:9".into(),
        QuotaClass::Default,
    )]);
    config.admin.api_key = "admin-secret".into();
    AppState::with_verifier(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(StubVerifier::default()),
    )
    .unwrap()
}

fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("authorization", format!("Bearer {}", key));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_rejects_missing_or_wrong_key() {
    let app = setup_admin_router(state());

    let res = app.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .oneshot(request("GET", "/admin/status", Some("wrong")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status_lists_backends() {
    let app = setup_admin_router(state());
    let res = app
        .oneshot(request("GET", "/admin/status", Some("admin-secret")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json(res).await;
    assert_eq!(body["status"], "operational");
    assert_eq!(body["backends"], serde_json::json!(["catalog"]));
}

#[tokio::test]
async fn test_reset_breaker() {
    let state = state();
    state.breakers.get("catalog");
    let app = setup_admin_router(state);

    let res = app
        .clone()
        .oneshot(request("POST", "/admin/breakers/catalog/reset", Some("admin-secret")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json(res).await["reset"], true);

    let res = app
        .clone()
        .oneshot(request("POST", "/admin/breakers/ghost/reset", Some("admin-secret")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .oneshot(request("GET", "/admin/breakers", Some("admin-secret")))
        .await
        .unwrap();
    let body = json(res).await;
    assert_eq!(body[0]["service"], "catalog");
    assert_eq!(body[0]["state"], "CLOSED");
}
