//! Error types for the image server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Only image file is allowed")]
    UnsupportedMediaType(String),

    #[error("Max image size is {}MB", .max / MIB)]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Not found")]
    NotFound,

    #[error("Storage error: {0}")]
    StorageFailure(#[from] std::io::Error),

    #[error("Clock returned an instant outside the identifier range: {0}")]
    Clock(DateTime<Utc>),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::InvalidInput(_)
            | AppError::UnsupportedMediaType(_)
            | AppError::PayloadTooLarge { .. } => {
                tracing::warn!("Rejected upload: {:?}", self);
                (StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            // Malformed identifiers land here too; clients never see the difference.
            AppError::NotFound => StatusCode::NOT_FOUND.into_response(),
            AppError::StorageFailure(e) => {
                tracing::error!("Storage error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
                    .into_response()
            }
            AppError::Clock(at) => {
                tracing::error!("Unusable clock reading: {}", at);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error".to_string(),
                )
                    .into_response()
            }
        }
    }
}
