//! Admin API routing and authentication.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use payment_monitor::admin::{setup_admin_router, AdminState};
use payment_monitor::config::EmptySettingsStore;
use payment_monitor::payments::DonationLedger;

mod common;
use common::*;

const KEY: &str = "test-admin-key";

async fn router(client: Arc<MockChainClient>) -> Router {
    let (engine, _rx) = build_engine(client, &test_config(), Arc::new(EmptySettingsStore)).await;
    let state = AdminState {
        engine: Arc::new(engine),
        ledger: Arc::new(DonationLedger::new(None)),
        api_key: Arc::from(KEY),
    };
    setup_admin_router(state, Duration::from_secs(5))
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {KEY}"));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_requires_bearer_token() {
    let app = router(Arc::new(MockChainClient::new())).await;

    let response = app
        .clone()
        .oneshot(Request::get("/admin/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::get("/admin/status")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_status() {
    let app = router(Arc::new(MockChainClient::new())).await;
    let response = app.oneshot(request(Method::GET, "/admin/status", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "operational");
    assert_eq!(body["network"], "ethereum");
    assert_eq!(body["listeners"], 0);
}

#[tokio::test]
async fn test_listener_start_and_stop() {
    let app = router(Arc::new(MockChainClient::new())).await;

    let start = json!({ "campaign_id": "12", "wallet": CAMPAIGN_WALLET.to_string() });
    let response = app
        .clone()
        .oneshot(request(Method::POST, "/admin/listeners", Some(start.clone())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "started");
    assert_eq!(body["handle"]["entity_id"], "12");
    assert_eq!(body["handle"]["connection_kind"], "http-poll");

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/admin/listeners", Some(start)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["status"], "already_active");

    let response = app
        .clone()
        .oneshot(request(Method::DELETE, "/admin/listeners/12", None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["status"], "stopped");

    let response = app
        .oneshot(request(Method::DELETE, "/admin/listeners/12", None))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["status"], "not_active");
}

#[tokio::test]
async fn test_invalid_wallet_is_bad_request() {
    let app = router(Arc::new(MockChainClient::new())).await;
    let response = app
        .oneshot(request(
            Method::POST,
            "/admin/listeners",
            Some(json!({ "campaign_id": "1", "wallet": "0xbad" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn test_verify_reports_outcome_and_message() {
    let client = Arc::new(MockChainClient::new());
    client.add_receipt(usdt_receipt(tx_hash(1), PLATFORM, 40_000_000));
    let app = router(client).await;

    let response = app
        .oneshot(request(
            Method::POST,
            "/admin/verify",
            Some(json!({
                "network": "ethereum",
                "tx_hash": tx_hash(1).to_string(),
                "expected_amount": "50",
                "token_address": USDT.to_string(),
                "decimals": 6,
                "recipient": PLATFORM.to_string(),
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "amount_mismatch");
    assert_eq!(body["expected"], "50");
    assert_eq!(body["actual"], "40");
    assert!(body["message"].as_str().unwrap().contains("insufficient"));
}

#[tokio::test]
async fn test_verify_transient_failure_is_unavailable() {
    let client = Arc::new(MockChainClient::new());
    client.fail_next_receipts(100);
    let app = router(client).await;

    let response = app
        .oneshot(request(
            Method::POST,
            "/admin/verify",
            Some(json!({
                "network": "ethereum",
                "tx_hash": tx_hash(2).to_string(),
                "expected_amount": "1",
                "decimals": 18,
                "recipient": PLATFORM.to_string(),
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
