use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unsupported event kind: {0}")]
    UnsupportedEventKind(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Client projection write failed: {0}")]
    ProjectionWrite(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the provider should redeliver this webhook. Maps to 5xx on
    /// the ingestion endpoint; everything else is a terminal 4xx/2xx.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::ConcurrentModification(_)
                | AppError::ProjectionWrite(_)
                | AppError::Database(_)
                | AppError::Pool(_)
                | AppError::Internal(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::InvalidSignature => {
                (StatusCode::BAD_REQUEST, "Invalid signature", None)
            }
            AppError::MalformedPayload(msg) => {
                (StatusCode::BAD_REQUEST, "Malformed payload", Some(msg.clone()))
            }
            AppError::UnsupportedEventKind(kind) => {
                // Acknowledged and dropped; the provider must not retry.
                (StatusCode::OK, "Event ignored", Some(kind.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone()))
            }
            AppError::ConcurrentModification(msg) => {
                tracing::warn!("Concurrent modification not resolved by retries: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Concurrent modification", None)
            }
            AppError::ProjectionWrite(msg) => {
                tracing::error!("Client projection write failed: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Projection write failed", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Store unavailable", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
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

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
