use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// User-facing error messages shared between handlers and tests.
pub mod msg {
    pub const MISSING_SIGNATURE: &str = "Missing stripe-signature header";
    pub const INVALID_SIGNATURE: &str = "Invalid signature";
    pub const INVALID_PAYLOAD: &str = "Invalid webhook payload";
    pub const WEBHOOK_NOT_CONFIGURED: &str = "Webhook secret not configured";
    pub const PERSISTENCE_FAILED: &str = "Failed to persist event";
    pub const INVALID_REQUEST_BODY: &str = "Invalid request body";
    pub const STRIPE_NOT_CONFIGURED: &str = "Payments are not configured";
    pub const INVALID_QUANTITY: &str = "Quantity must be between 1 and 99";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<StatusCode> for AppError {
    fn from(code: StatusCode) -> Self {
        match code {
            StatusCode::UNAUTHORIZED => AppError::Unauthorized,
            StatusCode::FORBIDDEN => AppError::Forbidden("Access denied".into()),
            StatusCode::NOT_FOUND => AppError::NotFound("Resource not found".into()),
            _ => AppError::Internal(format!("Status: {}", code)),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("JSON rejection: {}", rejection);
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(detail) => (StatusCode::NOT_FOUND, "Not found", Some(detail.clone())),
            AppError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, msg::INVALID_REQUEST_BODY, Some(detail.clone()))
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Forbidden(detail) => (StatusCode::FORBIDDEN, "Forbidden", Some(detail.clone())),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
