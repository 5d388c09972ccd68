//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bank_ledger::api::{self, AppState};
use bank_ledger::config::hash_api_key;
use bank_ledger::store::{MemoryStore, Store};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const API_KEY: &str = "test_key_123";

/// Router over a fresh in-memory store, plus the store for inspection
pub fn memory_app() -> (Router, MemoryStore) {
    let memory = MemoryStore::new();
    let store: Arc<dyn Store> = Arc::new(memory.clone());
    (app_with_store(store), memory)
}

pub fn app_with_store(store: Arc<dyn Store>) -> Router {
    let state = AppState::new(store, &hash_api_key(API_KEY), Duration::from_secs(5));
    api::build_router(state)
}

/// Send one request as `user` and return status plus parsed JSON body
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-API-Key", API_KEY);
    if let Some(user) = user {
        builder = builder.header("X-Request-User-Id", user.to_string());
    }

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

/// Account payload with an opening balance
pub fn account_body(balance: &str, is_primary: bool) -> Value {
    serde_json::json!({
        "account_number": "0012345678",
        "account_holder_name": "Test Holder",
        "bank_name": "Test Bank",
        "ifsc_code": "TEST0000001",
        "account_type": "savings",
        "opening_balance": balance,
        "is_primary": is_primary,
    })
}

/// Open an account through the API and return its id
pub async fn open_account(app: &Router, user: Uuid, balance: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/accounts",
        Some(user),
        Some(account_body(balance, false)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "account creation failed: {}", body);
    body["id"].as_str().unwrap().to_string()
}

/// Balance of an account, read through the API
pub async fn balance(app: &Router, user: Uuid, account_id: &str) -> rust_decimal::Decimal {
    let uri = format!("/api/v1/accounts/{}", account_id);
    let (status, body) = send(app, "GET", &uri, Some(user), None).await;
    assert_eq!(status, StatusCode::OK, "account lookup failed: {}", body);
    body["balance"].as_str().unwrap().parse().unwrap()
}
