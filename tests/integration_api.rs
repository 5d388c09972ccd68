//! API Integration Tests
//!
//! Drive the full router over the in-memory store.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use rust_decimal_macros::dec;
use serde_json::json;
use tower::util::ServiceExt;
use uuid::Uuid;

mod common;

use common::{balance, open_account, send};

#[tokio::test]
async fn test_health_needs_no_key() {
    let (app, _) = common::memory_app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_key_required() {
    let (app, _) = common::memory_app();

    let request = Request::builder()
        .uri("/api/v1/accounts")
        .header("X-Request-User-Id", Uuid::new_v4().to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/v1/accounts")
        .header("X-API-Key", "wrong")
        .header("X-Request-User-Id", Uuid::new_v4().to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_request_user_header_rules() {
    let (app, _) = common::memory_app();

    let (status, body) = send(&app, "GET", "/api/v1/accounts", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "missing_header");

    let request = Request::builder()
        .uri("/api/v1/accounts")
        .header("X-API-Key", common::API_KEY)
        .header("X-Request-User-Id", "not-a-uuid")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deposit_e2e() {
    let (app, _) = common::memory_app();
    let user = Uuid::new_v4();
    let account = open_account(&app, user, "100").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/transactions",
        Some(user),
        Some(json!({
            "account_id": account,
            "amount": 50,
            "transaction_type": "deposit",
            "description": "salary"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "deposit failed: {}", body);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["amount"], "50.00");
    assert_eq!(body["transaction_type"], "deposit");
    assert!(body["reference"].as_str().unwrap().starts_with("TXN"));
    assert!(body.get("recipient_account_id").is_none());
    assert_eq!(balance(&app, user, &account).await, dec!(150));
}

#[tokio::test]
async fn test_over_withdrawal_e2e() {
    let (app, store) = common::memory_app();
    let user = Uuid::new_v4();
    let account = open_account(&app, user, "100").await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/transactions",
        Some(user),
        Some(json!({
            "account_id": account,
            "amount": "150",
            "transaction_type": "withdrawal"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "insufficient_funds");
    assert_eq!(balance(&app, user, &account).await, dec!(100));
    assert!(store.entries().await.is_empty());
}

#[tokio::test]
async fn test_transfer_e2e() {
    let (app, _) = common::memory_app();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let a = open_account(&app, alice, "100").await;
    let b = open_account(&app, bob, "20").await;

    // Alice finds Bob's account through the directory
    let uri = format!("/api/v1/users/{}/accounts", bob);
    let (status, directory) = send(&app, "GET", &uri, Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(directory["accounts"][0]["id"], b.as_str());
    assert!(directory["accounts"][0].get("balance").is_none());

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/transactions",
        Some(alice),
        Some(json!({
            "account_id": a,
            "amount": "40.00",
            "transaction_type": "transfer",
            "recipient_account_id": b
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "transfer failed: {}", body);
    assert_eq!(body["recipient_account_id"], b.as_str());
    assert_eq!(balance(&app, alice, &a).await, dec!(60));
    assert_eq!(balance(&app, bob, &b).await, dec!(60));

    // Bob cannot read Alice's entry, but sees it in his account history
    let uri = format!("/api/v1/transactions/{}", body["id"].as_str().unwrap());
    let (status, _) = send(&app, "GET", &uri, Some(bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/api/v1/transactions?account_id={}", b);
    let (status, history) = send(&app, "GET", &uri, Some(bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_transaction_validation_errors() {
    let (app, _) = common::memory_app();
    let user = Uuid::new_v4();
    let account = open_account(&app, user, "100").await;

    let cases = [
        (json!({"account_id": account, "amount": 0, "transaction_type": "deposit"}), StatusCode::BAD_REQUEST, "invalid_amount"),
        (json!({"account_id": account, "transaction_type": "deposit"}), StatusCode::BAD_REQUEST, "invalid_amount"),
        (json!({"account_id": account, "amount": 5, "transaction_type": "loan"}), StatusCode::BAD_REQUEST, "invalid_transaction_type"),
        (json!({"account_id": account, "amount": 5, "transaction_type": "transfer"}), StatusCode::BAD_REQUEST, "missing_recipient"),
        (json!({"account_id": "abc", "amount": 5, "transaction_type": "deposit"}), StatusCode::BAD_REQUEST, "invalid_id"),
        (json!({"account_id": Uuid::new_v4(), "amount": 5, "transaction_type": "deposit"}), StatusCode::NOT_FOUND, "account_not_found"),
        (
            json!({"account_id": account, "amount": 5, "transaction_type": "transfer", "recipient_account_id": Uuid::new_v4()}),
            StatusCode::NOT_FOUND,
            "recipient_not_found",
        ),
    ];

    for (payload, expected_status, expected_code) in cases {
        let (status, body) = send(&app, "POST", "/api/v1/transactions", Some(user), Some(payload.clone())).await;
        assert_eq!(status, expected_status, "payload {} -> {}", payload, body);
        assert_eq!(body["error_code"], expected_code, "payload {}", payload);
    }

    // Someone else's account
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/transactions",
        Some(Uuid::new_v4()),
        Some(json!({"account_id": account, "amount": 5, "transaction_type": "withdrawal"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "access_denied");

    assert_eq!(balance(&app, user, &account).await, dec!(100));
}

#[tokio::test]
async fn test_primary_account_lifecycle() {
    let (app, _) = common::memory_app();
    let user = Uuid::new_v4();
    let first = open_account(&app, user, "0").await;

    // Second account asks to be primary and takes the flag
    let (status, second) = send(
        &app,
        "POST",
        "/api/v1/accounts",
        Some(user),
        Some(common::account_body("0", true)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["is_primary"], true);
    let second = second["id"].as_str().unwrap().to_string();

    let (_, list) = send(&app, "GET", "/api/v1/accounts", Some(user), None).await;
    let primaries: Vec<&str> = list["accounts"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|a| a["is_primary"] == true)
        .map(|a| a["id"].as_str().unwrap())
        .collect();
    assert_eq!(primaries, vec![second.as_str()]);

    // Balance edits are rejected
    let uri = format!("/api/v1/accounts/{}", first);
    let (status, _) = send(&app, "PUT", &uri, Some(user), Some(json!({"balance": "1000000"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Promote the first account back
    let (status, body) = send(&app, "PUT", &uri, Some(user), Some(json!({"is_primary": true}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_primary"], true);

    // Delete the primary; the other account inherits the flag
    let (status, closed) = send(&app, "DELETE", &uri, Some(user), None).await;
    assert_eq!(status, StatusCode::OK, "delete failed: {}", closed);
    assert_eq!(closed["new_primary"], second.as_str());

    // The last account cannot be deleted
    let uri = format!("/api/v1/accounts/{}", second);
    let (status, body) = send(&app, "DELETE", &uri, Some(user), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "last_account");
}

#[tokio::test]
async fn test_account_access_control() {
    let (app, _) = common::memory_app();
    let owner = Uuid::new_v4();
    let account = open_account(&app, owner, "10").await;
    let uri = format!("/api/v1/accounts/{}", account);

    let (status, _) = send(&app, "GET", &uri, Some(Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let missing = format!("/api/v1/accounts/{}", Uuid::new_v4());
    let (status, _) = send(&app, "GET", &missing, Some(owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/api/v1/accounts/xyz", Some(owner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_id");
}

#[tokio::test]
async fn test_history_paging() {
    let (app, _) = common::memory_app();
    let user = Uuid::new_v4();
    let account = open_account(&app, user, "0").await;

    for amount in ["1", "2", "3"] {
        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/transactions",
            Some(user),
            Some(json!({"account_id": account, "amount": amount, "transaction_type": "deposit"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = send(&app, "GET", "/api/v1/transactions?limit=2", Some(user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["transactions"].as_array().unwrap().len(), 2);

    let (_, rest) = send(&app, "GET", "/api/v1/transactions?limit=2&skip=2", Some(user), None).await;
    assert_eq!(rest["transactions"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/api/v1/transactions?limit=lots", Some(user), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
