//! Error handling module
//!
//! HTTP-facing error type and response conversion.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::{CoreError, IdError};
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Core errors, mapped per variant
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Core(CoreError::Store(err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn core_status(err: &CoreError) -> (StatusCode, &'static str, Option<String>) {
    match err {
        // 400 Bad Request
        CoreError::InvalidAmount(msg) => (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone())),
        CoreError::InvalidKind(kind) => {
            (StatusCode::BAD_REQUEST, "invalid_transaction_type", Some(kind.clone()))
        }
        CoreError::MissingRecipient => (StatusCode::BAD_REQUEST, "missing_recipient", None),
        CoreError::UnexpectedRecipient => (StatusCode::BAD_REQUEST, "unexpected_recipient", None),
        CoreError::SameAccountTransfer => (StatusCode::BAD_REQUEST, "same_account_transfer", None),
        CoreError::InsufficientFunds { .. } => {
            (StatusCode::BAD_REQUEST, "insufficient_funds", Some(err.to_string()))
        }
        CoreError::LastAccount(id) => (StatusCode::BAD_REQUEST, "last_account", Some(id.clone())),
        CoreError::PrimaryRequired(id) => {
            (StatusCode::BAD_REQUEST, "primary_required", Some(id.clone()))
        }
        CoreError::InvalidField { field, reason } => (
            StatusCode::BAD_REQUEST,
            "invalid_field",
            Some(format!("{}: {}", field, reason)),
        ),

        // 403 Forbidden
        CoreError::AccessDenied(msg) => (StatusCode::FORBIDDEN, "access_denied", Some(msg.clone())),

        // 404 Not Found
        CoreError::AccountNotFound(id) => (StatusCode::NOT_FOUND, "account_not_found", Some(id.clone())),
        CoreError::RecipientNotFound(id) => {
            (StatusCode::NOT_FOUND, "recipient_not_found", Some(id.clone()))
        }
        CoreError::TransactionNotFound(id) => {
            (StatusCode::NOT_FOUND, "transaction_not_found", Some(id.clone()))
        }

        // 500 Internal Server Error
        CoreError::ConsistencyViolation(msg) => {
            tracing::error!("Consistency violation: {}", msg);
            (StatusCode::INTERNAL_SERVER_ERROR, "consistency_violation", None)
        }
        CoreError::Store(e) => {
            tracing::error!("Store error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::InvalidId(e) => (StatusCode::BAD_REQUEST, "invalid_id", Some(e.value.clone())),
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }

            // 401 Unauthorized
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key", None),

            AppError::Core(err) => core_status(err),
        };

        // Server-side failures never echo internal detail
        let error = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
