//! Route modules for the image server

pub mod images;

use axum::http::StatusCode;

/// Fallback for unknown paths and unsupported methods: 404, empty body
pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
