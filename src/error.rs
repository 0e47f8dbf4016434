use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("User already has an active subscription")]
    AlreadySubscribed,

    #[error("Payment gateway not configured: {0}")]
    GatewayUnconfigured(String),

    #[error("Payment gateway request failed: {0}")]
    GatewayRequestFailed(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Key-value store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for AppError {
    fn from(rejection: axum::extract::rejection::PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;

        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::AlreadySubscribed => (
                StatusCode::BAD_REQUEST,
                "Already subscribed",
                Some("User already has an active subscription".to_string()),
            ),
            AppError::GatewayUnconfigured(gateway) => {
                tracing::error!("Payment gateway '{}' is not configured", gateway);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Payment gateway unavailable",
                    None,
                )
            }
            AppError::GatewayRequestFailed(msg) => {
                // Only the adapter's normalized message reaches the client
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Payment gateway error",
                    Some(msg.clone()),
                )
            }
            AppError::InvalidSignature => (
                StatusCode::BAD_REQUEST,
                "Invalid signature",
                None,
            ),
            AppError::RateLimitExceeded { retry_after_secs } => {
                retry_after = Some(*retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Rate limit exceeded",
                    Some(format!("Try again in {} seconds", retry_after_secs)),
                )
            }
            AppError::StoreUnavailable(e) => {
                tracing::error!("Key-value store error: {}", e);
                retry_after = Some(1);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable",
                    None,
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Convert `Option<T>` lookups into `NotFound` errors.
pub trait OptionExt<T> {
    fn or_not_found(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(msg.to_string()))
    }
}

/// Client-facing messages shared across handlers.
pub mod msg {
    pub const USER_NOT_FOUND: &str = "User not found";
    pub const EMAIL_EMPTY: &str = "Email cannot be empty";
    pub const INVALID_EMAIL_FORMAT: &str = "Invalid email format";
    pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 8 characters";
    pub const EMAIL_ALREADY_REGISTERED: &str = "Email already registered";
    pub const UNKNOWN_GATEWAY: &str = "Unknown payment gateway";
    pub const MALFORMED_WEBHOOK: &str = "Malformed webhook payload";
    pub const PAYMENT_ID_REQUIRED: &str = "payment_id is required";
    pub const CONFIRMATION_NOT_SUPPORTED: &str =
        "This gateway does not use client-side payment verification";
}
