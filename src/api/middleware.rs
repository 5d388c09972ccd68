//! API Middleware
//!
//! Authentication and request logging middleware.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::config::hash_api_key;
use crate::domain::{OperationContext, UserId};
use crate::error::AppError;

use super::AppState;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const REQUEST_USER_HEADER: &str = "X-Request-User-Id";
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

/// Request user from X-Request-User-Id header
#[derive(Debug, Clone, Copy)]
pub struct RequestUser {
    pub user_id: UserId,
}

/// Handlers that act on behalf of a user take `RequestUser` as an argument;
/// a request without the header is rejected before the handler runs.
#[async_trait]
impl<S> FromRequestParts<S> for RequestUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestUser>()
            .copied()
            .ok_or_else(|| AppError::MissingHeader(REQUEST_USER_HEADER.to_string()))
    }
}

// =========================================================================
// API Key Authentication Middleware
// =========================================================================

/// Validate X-API-Key and attach the request user and operation context
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidApiKey)?;

    if hash_api_key(api_key) != *state.api_key_hash {
        return Err(AppError::InvalidApiKey);
    }

    let mut context = OperationContext::new();

    // Some endpoints require this header; they extract `RequestUser`
    if let Some(value) = headers.get(REQUEST_USER_HEADER) {
        let raw = value
            .to_str()
            .map_err(|_| AppError::InvalidRequest(format!("{} is not valid text", REQUEST_USER_HEADER)))?;
        let user_id = UserId::parse(raw)?;
        request.extensions_mut().insert(RequestUser { user_id });
        context = context.with_request_user(user_id);
    }

    // Extract correlation ID or generate new one
    let correlation_id = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    request
        .extensions_mut()
        .insert(context.with_correlation_id(correlation_id));

    Ok(next.run(request).await)
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["x-api-key", "authorization", "cookie", "set-cookie"];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let masked_value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let headers = mask_headers_for_logging(request.headers());

    // Runs before auth, so read the header rather than the context
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status(),
        duration_ms = %start.elapsed().as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
