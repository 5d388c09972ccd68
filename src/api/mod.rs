//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::{middleware as axum_middleware, routing::get, Router};

use crate::handlers::{AccountManager, LedgerQueries, TransactionCoordinator};
use crate::store::Store;

pub use routes::create_router;

/// Shared state for every request
#[derive(Clone)]
pub struct AppState {
    pub coordinator: TransactionCoordinator,
    pub accounts: AccountManager,
    pub queries: LedgerQueries,
    /// SHA-256 hex digest of the accepted API key
    pub api_key_hash: Arc<str>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, api_key_hash: &str, transaction_timeout: Duration) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store.clone()).with_timeout(transaction_timeout),
            accounts: AccountManager::new(store.clone()),
            queries: LedgerQueries::new(store),
            api_key_hash: Arc::from(api_key_hash),
        }
    }
}

/// Build the application router: `/health` plus the authenticated `/api/v1`
pub fn build_router(state: AppState) -> Router {
    // Layers run last-added first: logging -> auth -> handler
    let protected_routes = create_router()
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", protected_routes)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
