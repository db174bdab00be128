use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cloud::CloudError;

/// Failures of the record store, event log and subscription registry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("DB error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Failures delivering a notification.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{endpoint} responded with {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },
}

/// Failures applying a settings update to a live monitor.
#[derive(Debug, Error)]
pub enum ConfigureError {
    #[error("Invalid settings: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Store(StoreError::NotFound(msg)) | AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, msg)
            }
            AppError::Store(ref e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Cloud(ref e) if e.is_auth_failure() => {
                (StatusCode::FORBIDDEN, "TP-Link authentication failed".to_string())
            }
            AppError::Cloud(ref e) => {
                tracing::warn!("Cloud error: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "TP-Link cloud unavailable".to_string(),
                )
            }
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<ConfigureError> for AppError {
    fn from(err: ConfigureError) -> Self {
        match err {
            ConfigureError::Invalid(msg) => AppError::InvalidInput(msg),
            ConfigureError::Store(e) => AppError::Store(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
